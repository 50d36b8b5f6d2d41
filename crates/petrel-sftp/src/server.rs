//! SFTP session and dispatcher
//!
//! One session per process: the serve loop reads a frame, hands the
//! payload to the dispatcher, and writes back at most one response frame.
//! The first packet must be INIT; after that each request opcode maps to
//! exactly one handler. Filesystem failures become STATUS responses and
//! the session continues; malformed or out-of-sequence packets are fatal.

use std::fs::{DirBuilder, Permissions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, FileExt, PermissionsExt};

use tracing::{debug, warn};

use crate::error::{Error, Result, status_for};
use crate::frame;
use crate::handle::{Handle, HandleTable};
use crate::packet::{PacketReader, PacketWriter};
use crate::protocol::{
    DEFAULT_DIR_PERM, DEFAULT_FILE_PERM, FileAttrs, MAX_ATTRS_BYTES, MAX_PACKET, MessageType,
    OpenFlags, PERM_MASK, SFTP_VERSION, StatusCode,
};
use crate::unix::{self, DirStream, path_from_bytes};

/// DATA response header: opcode + request id + payload length.
const DATA_HEADER: usize = 1 + 4 + 4;

/// Run a session over the given streams until end-of-stream.
///
/// This is the whole process lifecycle: the parent SSH server owns
/// authentication and transport, and closes our stdin when the client is
/// done. Returns `Ok(())` on orderly EOF.
pub fn serve<R, W>(reader: &mut R, writer: &mut W) -> Result<()>
where
    R: Read + AsRawFd,
    W: Write + AsRawFd,
{
    let mut session = Session::new();
    let mut inbuf = vec![0u8; MAX_PACKET];
    let mut out = PacketWriter::new();

    loop {
        let len = match frame::read_frame(reader, &mut inbuf)? {
            Some(len) => len,
            None => {
                debug!("end of stream");
                return Ok(());
            }
        };

        out.clear();
        let frame_len = out.mark();
        out.put_u32(0);

        // Zero-length payloads are silently discarded
        if len > 0 {
            session.handle_packet(&inbuf[..len], &mut out)?;
        }

        let payload_len = out.len() - 4;
        if payload_len > 0 {
            out.patch_u32(frame_len, payload_len as u32);
            frame::write_frame(writer, out.as_slice())?;
        }
    }
}

/// Session state: the handle table and the INIT gate.
pub struct Session {
    handles: HandleTable,
    have_init: bool,
}

impl Session {
    /// Fresh session awaiting INIT.
    pub fn new() -> Self {
        Self {
            handles: HandleTable::new(),
            have_init: false,
        }
    }

    /// Process one request payload, appending at most one response to `out`.
    ///
    /// # Errors
    ///
    /// An error return is protocol-fatal: a non-INIT packet before the
    /// handshake, a repeated INIT, an unsupported client version, or a
    /// request body shorter than its opcode demands.
    pub fn handle_packet(&mut self, payload: &[u8], out: &mut PacketWriter) -> Result<()> {
        let mut r = PacketReader::new(payload);
        let opcode = r.get_u8()?;

        if !self.have_init {
            if opcode != MessageType::Init as u8 {
                return Err(Error::Protocol(format!(
                    "expected INIT as the first packet, got opcode {opcode}"
                )));
            }
            self.init(&mut r, out)?;
            self.have_init = true;
            return Ok(());
        }

        match MessageType::try_from(opcode) {
            Ok(MessageType::Init) => Err(Error::Protocol("duplicate INIT".into())),
            Ok(MessageType::Open) => self.open(&mut r, out),
            Ok(MessageType::Close) => self.close(&mut r, out),
            Ok(MessageType::Read) => self.read(&mut r, out),
            Ok(MessageType::Write) => self.write(&mut r, out),
            Ok(MessageType::Stat) => self.path_stat(&mut r, out, true),
            Ok(MessageType::Lstat) => self.path_stat(&mut r, out, false),
            Ok(MessageType::Fstat) => self.fstat(&mut r, out),
            Ok(MessageType::Setstat) => self.setstat(&mut r, out),
            Ok(MessageType::Fsetstat) => self.fsetstat(&mut r, out),
            Ok(MessageType::Opendir) => self.opendir(&mut r, out),
            Ok(MessageType::Readdir) => self.readdir(&mut r, out),
            Ok(MessageType::Remove) => self.remove(&mut r, out),
            Ok(MessageType::Mkdir) => self.mkdir(&mut r, out),
            Ok(MessageType::Rmdir) => self.rmdir(&mut r, out),
            Ok(MessageType::Realpath) => self.realpath(&mut r, out),
            Ok(MessageType::Rename) => self.rename(&mut r, out),
            Ok(MessageType::Readlink) => self.readlink(&mut r, out),
            Ok(MessageType::Symlink) => self.symlink(&mut r, out),
            Ok(_) | Err(_) => {
                // Every non-INIT request begins with an id and every
                // response echoes it
                let id = r.get_u32()?;
                warn!(opcode, id, "unsupported request");
                put_status(out, id, StatusCode::OpUnsupported);
                Ok(())
            }
        }
    }

    fn init(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let version = r.get_u32()?;
        if version < SFTP_VERSION {
            return Err(Error::Protocol(format!(
                "client version {version} below minimum {SFTP_VERSION}"
            )));
        }
        debug!(version, "client INIT");

        // VERSION carries no request id and no extension pairs
        w.put_u8(MessageType::Version as u8);
        w.put_u32(SFTP_VERSION);
        Ok(())
    }

    fn open(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let filename = r.get_string()?;
        let pflags = OpenFlags(r.get_u32()?);
        let attrs = FileAttrs::decode(r)?;
        let mode = attrs.permissions.map_or(DEFAULT_FILE_PERM, |p| p & PERM_MASK);
        debug!(id, file = %String::from_utf8_lossy(filename), pflags = pflags.0, "OPEN");

        match unix::open(filename, pflags, mode) {
            Ok(file) => match self.handles.alloc_file(file) {
                Some(index) => put_handle(w, id, index),
                // alloc_file closed the file on the way out
                None => put_status(w, id, StatusCode::Failure),
            },
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn close(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let wire = r.get_string()?;
        debug!(id, "CLOSE");

        match self.handles.take(wire) {
            None => {
                warn!(id, "CLOSE of unknown handle");
                put_status(w, id, StatusCode::Failure);
            }
            Some(handle) => {
                let released = match handle {
                    Handle::File(file) => unix::close_file(file),
                    Handle::Dir(dir) => dir.close(),
                    Handle::Free => Ok(()),
                };
                match released {
                    Ok(()) => put_status(w, id, StatusCode::Ok),
                    Err(e) => put_status(w, id, status_for(&e)),
                }
            }
        }
        Ok(())
    }

    fn read(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let wire = r.get_string()?;
        let offset = r.get_u64()?;
        let len = r.get_u32()? as usize;
        debug!(id, offset, len, "READ");

        let Some(Handle::File(file)) = self.handles.lookup(wire) else {
            warn!(id, "READ with invalid handle");
            put_status(w, id, StatusCode::Failure);
            return Ok(());
        };

        // Clamp so the DATA frame fits in the output packet
        let len = len.min(w.remaining() - DATA_HEADER);

        let start = w.mark();
        w.put_u8(MessageType::Data as u8);
        w.put_u32(id);
        let len_field = w.mark();
        w.put_u32(0);

        // The file data lands directly in the packet
        let region = w.put_reserved(len);
        match file.read_at(region, offset) {
            Ok(0) => {
                w.truncate(start);
                put_status(w, id, StatusCode::Eof);
            }
            Ok(n) => {
                w.shrink(len - n);
                w.patch_u32(len_field, n as u32);
            }
            Err(e) => {
                w.truncate(start);
                put_status(w, id, status_for(&e));
            }
        }
        Ok(())
    }

    fn write(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let wire = r.get_string()?;
        let offset = r.get_u64()?;
        let data = r.get_data()?;
        debug!(id, offset, len = data.len(), "WRITE");

        let Some(Handle::File(file)) = self.handles.lookup(wire) else {
            warn!(id, "WRITE with invalid handle");
            put_status(w, id, StatusCode::Failure);
            return Ok(());
        };

        match file.write_at(data, offset) {
            Ok(n) if n == data.len() => put_status(w, id, StatusCode::Ok),
            // v3 has no partial-write status
            Ok(_) => put_status(w, id, StatusCode::Failure),
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn path_stat(
        &mut self,
        r: &mut PacketReader<'_>,
        w: &mut PacketWriter,
        follow_symlinks: bool,
    ) -> Result<()> {
        let id = r.get_u32()?;
        let path = r.get_string()?;
        debug!(id, path = %String::from_utf8_lossy(path), follow_symlinks, "STAT");

        let p = path_from_bytes(path);
        let result = if follow_symlinks {
            std::fs::metadata(p)
        } else {
            std::fs::symlink_metadata(p)
        };
        match result {
            Ok(md) => put_attrs(w, id, &unix::attrs_from_metadata(&md)),
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn fstat(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let wire = r.get_string()?;
        debug!(id, "FSTAT");

        let Some(Handle::File(file)) = self.handles.lookup(wire) else {
            warn!(id, "FSTAT with invalid handle");
            put_status(w, id, StatusCode::Failure);
            return Ok(());
        };

        match file.metadata() {
            Ok(md) => put_attrs(w, id, &unix::attrs_from_metadata(&md)),
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn setstat(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let path = r.get_string()?;
        let attrs = FileAttrs::decode(r)?;
        debug!(id, path = %String::from_utf8_lossy(path), "SETSTAT");

        // Fixed application order; the first failure answers and the rest
        // are not attempted
        if let Some(perm) = attrs.permissions {
            let perms = Permissions::from_mode(perm & PERM_MASK);
            if let Err(e) = std::fs::set_permissions(path_from_bytes(path), perms) {
                put_status(w, id, status_for(&e));
                return Ok(());
            }
        }
        if let (Some(atime), Some(mtime)) = (attrs.atime, attrs.mtime) {
            if let Err(e) = unix::set_times(path, atime, mtime) {
                put_status(w, id, status_for(&e));
                return Ok(());
            }
        }
        if let (Some(uid), Some(gid)) = (attrs.uid, attrs.gid) {
            if let Err(e) = unix::chown(path, uid, gid) {
                put_status(w, id, status_for(&e));
                return Ok(());
            }
        }
        put_status(w, id, StatusCode::Ok);
        Ok(())
    }

    fn fsetstat(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let wire = r.get_string()?;
        let attrs = FileAttrs::decode(r)?;
        debug!(id, "FSETSTAT");

        let Some(Handle::File(file)) = self.handles.lookup(wire) else {
            warn!(id, "FSETSTAT with invalid handle");
            put_status(w, id, StatusCode::Failure);
            return Ok(());
        };

        if let Some(perm) = attrs.permissions {
            if let Err(e) = file.set_permissions(Permissions::from_mode(perm & PERM_MASK)) {
                put_status(w, id, status_for(&e));
                return Ok(());
            }
        }
        if let (Some(atime), Some(mtime)) = (attrs.atime, attrs.mtime) {
            if let Err(e) = unix::set_times_fd(file.as_raw_fd(), atime, mtime) {
                put_status(w, id, status_for(&e));
                return Ok(());
            }
        }
        if let (Some(uid), Some(gid)) = (attrs.uid, attrs.gid) {
            if let Err(e) = unix::fchown(file.as_raw_fd(), uid, gid) {
                put_status(w, id, status_for(&e));
                return Ok(());
            }
        }
        put_status(w, id, StatusCode::Ok);
        Ok(())
    }

    fn opendir(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let path = r.get_string()?;
        debug!(id, path = %String::from_utf8_lossy(path), "OPENDIR");

        match DirStream::open(path) {
            Ok(dir) => match self.handles.alloc_dir(dir) {
                Some(index) => put_handle(w, id, index),
                None => put_status(w, id, StatusCode::Failure),
            },
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn readdir(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let wire = r.get_string()?;
        debug!(id, "READDIR");

        let Some(Handle::Dir(dir)) = self.handles.lookup(wire) else {
            warn!(id, "READDIR with invalid handle");
            put_status(w, id, StatusCode::Failure);
            return Ok(());
        };

        // Build a NAME response optimistically; the count is patched in at
        // the end, and the whole thing rolls back to EOF if no entry fits
        let start = w.mark();
        w.put_u8(MessageType::Name as u8);
        w.put_u32(id);
        let count_field = w.mark();
        w.put_u32(0);

        let mut count: u32 = 0;
        loop {
            let position = dir.tell();
            let Some(name) = dir.read_entry() else {
                break;
            };
            // Entries that cannot be stat'd are silently skipped
            let Ok(attrs) = dir.stat_entry(&name) else {
                continue;
            };

            let name = name.as_bytes();
            let projected = (name.len() + 4) * 2 + MAX_ATTRS_BYTES;
            if projected <= w.remaining() {
                w.put_string(name);
                // The long-name mirrors the filename in this profile
                w.put_string(name);
                attrs.encode_into(w);
                count += 1;
            } else if count > 0 {
                // Doesn't fit this time round; resume here on the next
                // READDIR
                dir.seek(position);
                break;
            }
            // A name too long to ever deliver is skipped outright
        }

        if count > 0 {
            w.patch_u32(count_field, count);
        } else {
            w.truncate(start);
            put_status(w, id, StatusCode::Eof);
        }
        Ok(())
    }

    fn remove(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let filename = r.get_string()?;
        debug!(id, file = %String::from_utf8_lossy(filename), "REMOVE");

        match unix::remove(filename) {
            Ok(()) => put_status(w, id, StatusCode::Ok),
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn mkdir(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let path = r.get_string()?;
        let attrs = FileAttrs::decode(r)?;
        let mode = attrs.permissions.map_or(DEFAULT_DIR_PERM, |p| p & PERM_MASK);
        debug!(id, path = %String::from_utf8_lossy(path), mode, "MKDIR");

        // Attrs other than permissions are ignored here
        let result = DirBuilder::new().mode(mode).create(path_from_bytes(path));
        match result {
            Ok(()) => put_status(w, id, StatusCode::Ok),
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn rmdir(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let path = r.get_string()?;
        debug!(id, path = %String::from_utf8_lossy(path), "RMDIR");

        match std::fs::remove_dir(path_from_bytes(path)) {
            Ok(()) => put_status(w, id, StatusCode::Ok),
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn realpath(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let path = r.get_string()?;
        debug!(id, path = %String::from_utf8_lossy(path), "REALPATH");

        match std::fs::canonicalize(path_from_bytes(path)) {
            Ok(resolved) => {
                let resolved = resolved.as_os_str().as_bytes();
                w.put_u8(MessageType::Name as u8);
                w.put_u32(id);
                w.put_u32(1);
                w.put_string(resolved);
                w.put_string(resolved);
                // Dummy attributes, as the response shape demands
                FileAttrs::default().encode_into(w);
            }
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn rename(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let old = r.get_string()?;
        let new = r.get_string()?;
        debug!(
            id,
            old = %String::from_utf8_lossy(old),
            new = %String::from_utf8_lossy(new),
            "RENAME"
        );

        match std::fs::rename(path_from_bytes(old), path_from_bytes(new)) {
            Ok(()) => put_status(w, id, StatusCode::Ok),
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }

    fn readlink(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let path = r.get_string()?;
        debug!(id, path = %String::from_utf8_lossy(path), "READLINK");

        let start = w.mark();
        w.put_u8(MessageType::Name as u8);
        w.put_u32(id);
        w.put_u32(1);

        // The target appears twice (filename and long-name) with an attrs
        // record after it; cap its length so all three fit
        let cap = (w.remaining() - MAX_ATTRS_BYTES) / 2 - 4;
        match unix::read_link_bounded(path, cap) {
            Ok(target) => {
                w.put_string(&target);
                w.put_string(&target);
                FileAttrs::default().encode_into(w);
            }
            Err(e) => {
                w.truncate(start);
                put_status(w, id, status_for(&e));
            }
        }
        Ok(())
    }

    fn symlink(&mut self, r: &mut PacketReader<'_>, w: &mut PacketWriter) -> Result<()> {
        let id = r.get_u32()?;
        let linkpath = r.get_string()?;
        let targetpath = r.get_string()?;
        debug!(
            id,
            link = %String::from_utf8_lossy(linkpath),
            target = %String::from_utf8_lossy(targetpath),
            "SYMLINK"
        );

        // Wire order is (linkpath, targetpath); the host call takes the
        // target first
        let result =
            std::os::unix::fs::symlink(path_from_bytes(targetpath), path_from_bytes(linkpath));
        match result {
            Ok(()) => put_status(w, id, StatusCode::Ok),
            Err(e) => put_status(w, id, status_for(&e)),
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn put_status(w: &mut PacketWriter, id: u32, code: StatusCode) {
    w.put_u8(MessageType::Status as u8);
    w.put_u32(id);
    w.put_u32(code.into());
    w.put_string(code.message().as_bytes());
    w.put_string(b"en");
}

fn put_handle(w: &mut PacketWriter, id: u32, index: u32) {
    w.put_u8(MessageType::Handle as u8);
    w.put_u32(id);
    w.put_string(HandleTable::encode(index).as_bytes());
}

fn put_attrs(w: &mut PacketWriter, id: u32, attrs: &FileAttrs) {
    w.put_u8(MessageType::Attrs as u8);
    w.put_u32(id);
    attrs.encode_into(w);
}
