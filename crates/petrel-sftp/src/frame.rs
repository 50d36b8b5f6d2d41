//! Frame I/O
//!
//! Every SFTP packet travels as a 4-byte big-endian length followed by
//! that many payload bytes. Reads and writes block; a poll(2) guards each
//! one in case the parent process handed us non-blocking descriptors.
//! A zero-byte read anywhere — even mid-frame — is the orderly end of the
//! session.

use std::io::{Read, Write};
use std::os::fd::AsRawFd;

use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::MAX_PACKET;

/// Read one frame into the start of `buf`, returning the payload length,
/// or `None` on orderly end-of-stream.
pub fn read_frame<R: Read + AsRawFd>(reader: &mut R, buf: &mut [u8]) -> Result<Option<usize>> {
    let mut header = [0u8; 4];
    if !read_full(reader, &mut header)? {
        return Ok(None);
    }
    let len = u32::from_be_bytes(header) as usize;
    if len > buf.len() {
        return Err(Error::Protocol(format!(
            "frame payload of {len} bytes exceeds the {MAX_PACKET} byte maximum"
        )));
    }
    if !read_full(reader, &mut buf[..len])? {
        return Ok(None);
    }
    trace!(len, "frame in");
    Ok(Some(len))
}

/// Write a complete frame, retrying short writes until everything is on
/// the wire.
pub fn write_frame<W: Write + AsRawFd>(writer: &mut W, mut bytes: &[u8]) -> Result<()> {
    trace!(len = bytes.len(), "frame out");
    while !bytes.is_empty() {
        crate::unix::poll_writable(writer.as_raw_fd())?;
        match writer.write(bytes) {
            Ok(0) => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "response stream accepted no bytes",
                )));
            }
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    writer.flush()?;
    Ok(())
}

/// Fill `buf` exactly; `false` means the peer closed the stream first.
fn read_full<R: Read + AsRawFd>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        crate::unix::poll_readable(reader.as_raw_fd())?;
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
