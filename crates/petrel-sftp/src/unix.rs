//! Host filesystem primitives
//!
//! The protocol handlers go through std wherever std has an idiomatic
//! wrapper (`Metadata`, `DirBuilder`, `symlink`, `canonicalize`). This
//! module covers the rest with thin `libc` shims: open(2) with the exact
//! portable-flag translation, the seekable directory stream, timestamp and
//! ownership updates, bounded readlink, and the descriptor readiness poll
//! used before every blocking stream read or write.

use std::ffi::{CStr, CString};
use std::fs::File;
use std::io;
use std::os::fd::{FromRawFd, IntoRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::ptr::NonNull;

use crate::protocol::{FileAttrs, OpenFlags};

/// Borrow wire path bytes as a host path.
pub fn path_from_bytes(bytes: &[u8]) -> &Path {
    Path::new(std::ffi::OsStr::from_bytes(bytes))
}

/// Wire paths may carry any bytes; an interior NUL cannot reach a syscall,
/// so it is reported the way the kernel would reject a bad argument.
fn cpath(path: &[u8]) -> io::Result<CString> {
    CString::new(path).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

/// Open a file with the portable-flag translation the protocol mandates:
/// READ and WRITE select the access mode, CREAT/TRUNC/EXCL fold in, and
/// APPEND is deliberately ignored (clients position writes by offset).
pub fn open(path: &[u8], pflags: OpenFlags, mode: u32) -> io::Result<File> {
    let mut flags = if pflags.has_read() && pflags.has_write() {
        libc::O_RDWR
    } else if pflags.has_read() {
        libc::O_RDONLY
    } else if pflags.has_write() {
        libc::O_WRONLY
    } else {
        0
    };
    if pflags.has_creat() {
        flags |= libc::O_CREAT;
    }
    if pflags.has_trunc() {
        flags |= libc::O_TRUNC;
    }
    if pflags.has_excl() {
        flags |= libc::O_EXCL;
    }

    let c = cpath(path)?;
    let fd = unsafe { libc::open(c.as_ptr(), flags, mode as libc::mode_t) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Close a file explicitly so the result is observable; `Drop` would
/// swallow it and CLOSE must report close errors to the client.
pub fn close_file(file: File) -> io::Result<()> {
    let fd = file.into_raw_fd();
    if unsafe { libc::close(fd) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Seekable directory stream over an open directory descriptor.
///
/// Holding the descriptor alongside the stream lets READDIR stat entries
/// relative to it (fstatat) without re-joining paths. Closing the stream
/// also closes the descriptor, per fdopendir(3).
pub struct DirStream {
    dir: NonNull<libc::DIR>,
    fd: RawFd,
}

impl DirStream {
    /// Open `path` read-only and wrap the descriptor in a directory stream.
    pub fn open(path: &[u8]) -> io::Result<Self> {
        let c = cpath(path)?;
        let fd = unsafe { libc::open(c.as_ptr(), libc::O_RDONLY) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let dir = unsafe { libc::fdopendir(fd) };
        match NonNull::new(dir) {
            Some(dir) => Ok(Self { dir, fd }),
            None => {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                Err(err)
            }
        }
    }

    /// Next entry name, or `None` at end of stream. Dot entries are
    /// reported like any other; clients filter them.
    pub fn read_entry(&mut self) -> Option<CString> {
        let entry = unsafe { libc::readdir(self.dir.as_ptr()) };
        if entry.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr((*entry).d_name.as_ptr()) };
        Some(name.to_owned())
    }

    /// Current resumable position, valid for a later [`Self::seek`].
    pub fn tell(&mut self) -> libc::c_long {
        unsafe { libc::telldir(self.dir.as_ptr()) }
    }

    /// Rewind to a position previously returned by [`Self::tell`].
    pub fn seek(&mut self, pos: libc::c_long) {
        unsafe { libc::seekdir(self.dir.as_ptr(), pos) }
    }

    /// Stat an entry relative to this directory, following symlinks.
    pub fn stat_entry(&self, name: &CStr) -> io::Result<FileAttrs> {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::fstatat(self.fd, name.as_ptr(), &mut st, 0) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(attrs_from_stat(&st))
    }

    /// Close explicitly, reporting the result. closedir(3) releases the
    /// underlying descriptor as well.
    pub fn close(self) -> io::Result<()> {
        let rc = unsafe { libc::closedir(self.dir.as_ptr()) };
        std::mem::forget(self);
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        unsafe { libc::closedir(self.dir.as_ptr()) };
    }
}

/// Remove a filesystem entry with remove(3): files and symlinks always,
/// directories only when empty.
pub fn remove(path: &[u8]) -> io::Result<()> {
    let c = cpath(path)?;
    if unsafe { libc::remove(c.as_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn timevals(atime: u32, mtime: u32) -> [libc::timeval; 2] {
    [
        libc::timeval {
            tv_sec: atime as libc::time_t,
            tv_usec: 0,
        },
        libc::timeval {
            tv_sec: mtime as libc::time_t,
            tv_usec: 0,
        },
    ]
}

/// Set access and modification times by path (whole seconds).
pub fn set_times(path: &[u8], atime: u32, mtime: u32) -> io::Result<()> {
    let c = cpath(path)?;
    let tv = timevals(atime, mtime);
    if unsafe { libc::utimes(c.as_ptr(), tv.as_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Set access and modification times on an open descriptor.
pub fn set_times_fd(fd: RawFd, atime: u32, mtime: u32) -> io::Result<()> {
    let tv = timevals(atime, mtime);
    if unsafe { libc::futimes(fd, tv.as_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Change ownership by path.
pub fn chown(path: &[u8], uid: u32, gid: u32) -> io::Result<()> {
    let c = cpath(path)?;
    if unsafe { libc::chown(c.as_ptr(), uid, gid) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Change ownership on an open descriptor.
pub fn fchown(fd: RawFd, uid: u32, gid: u32) -> io::Result<()> {
    if unsafe { libc::fchown(fd, uid, gid) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Read a symlink target into a buffer of at most `cap` bytes. Longer
/// targets are silently clipped, which is what bounds READLINK responses
/// to the output packet.
pub fn read_link_bounded(path: &[u8], cap: usize) -> io::Result<Vec<u8>> {
    let c = cpath(path)?;
    let mut buf = vec![0u8; cap];
    let len = unsafe {
        libc::readlink(
            c.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
        )
    };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }
    buf.truncate(len as usize);
    Ok(buf)
}

fn poll_fd(fd: RawFd, events: libc::c_short) -> io::Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    loop {
        let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
        if rc >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Block until `fd` is readable. Defensive: the parent may have marked the
/// descriptor non-blocking, and this server must behave as if blocking.
pub fn poll_readable(fd: RawFd) -> io::Result<()> {
    poll_fd(fd, libc::POLLIN)
}

/// Block until `fd` is writable.
pub fn poll_writable(fd: RawFd) -> io::Result<()> {
    poll_fd(fd, libc::POLLOUT)
}

/// Translate host metadata into a fully populated attribute record.
/// Permissions carry the complete st_mode; clients parse the file-type
/// bits to tell files, directories and links apart.
pub fn attrs_from_metadata(md: &std::fs::Metadata) -> FileAttrs {
    FileAttrs {
        size: Some(md.size()),
        uid: Some(md.uid()),
        gid: Some(md.gid()),
        permissions: Some(md.mode()),
        atime: Some(md.atime() as u32),
        mtime: Some(md.mtime() as u32),
    }
}

fn attrs_from_stat(st: &libc::stat) -> FileAttrs {
    FileAttrs {
        size: Some(st.st_size as u64),
        uid: Some(st.st_uid),
        gid: Some(st.st_gid),
        permissions: Some(st.st_mode as u32),
        atime: Some(st.st_atime as u32),
        mtime: Some(st.st_mtime as u32),
    }
}
