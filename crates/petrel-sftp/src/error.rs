//! Error types and the errno → status mapping

use std::io;

use thiserror::Error;

use crate::protocol::StatusCode;

/// Result type alias for SFTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal session errors.
///
/// Per-operation filesystem failures never surface here; they become
/// STATUS responses and the session continues. This type covers the
/// protocol-fatal tier: stream I/O failures and malformed or
/// out-of-sequence packets, both of which end the process.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error on the request or response stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or out-of-sequence packet
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Map a filesystem error to the closed set of SFTP status codes.
///
/// The taxonomy is deliberately coarse (EBADF is "no such file", not
/// "failure") and must stay exactly this way for client compatibility.
pub fn status_for(err: &io::Error) -> StatusCode {
    if let Some(errno) = err.raw_os_error() {
        return match errno {
            0 => StatusCode::Ok,
            libc::ENOENT | libc::ENOTDIR | libc::EBADF | libc::ELOOP => StatusCode::NoSuchFile,
            libc::EPERM | libc::EACCES | libc::EFAULT => StatusCode::PermissionDenied,
            libc::ENAMETOOLONG | libc::EINVAL => StatusCode::BadMessage,
            _ => StatusCode::Failure,
        };
    }

    // Synthetic errors from std wrappers carry no errno; fall back to the
    // kinds that have an unambiguous place in the table above.
    match err.kind() {
        io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        io::ErrorKind::InvalidInput => StatusCode::BadMessage,
        _ => StatusCode::Failure,
    }
}
