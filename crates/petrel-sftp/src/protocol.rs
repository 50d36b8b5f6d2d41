//! SFTP protocol definitions
//!
//! Wire-level constants and composite types for version 3 of the SSH File
//! Transfer Protocol (draft-ietf-secsh-filexfer-02). Primitive encodings
//! follow RFC 4251: integers are big-endian, strings are a uint32 length
//! followed by that many bytes of arbitrary binary content.

use crate::error::Result;
use crate::packet::{PacketReader, PacketWriter};

/// Protocol version spoken by this server.
pub const SFTP_VERSION: u32 = 3;

/// Maximum packet payload. The specification requires servers to accept
/// packets of at least 34000 bytes; this implementation caps there.
pub const MAX_PACKET: usize = 34000;

/// Upper bound on the serialized size of a fully populated [`FileAttrs`]:
/// flags + size + uid + gid + permissions + atime + mtime.
pub const MAX_ATTRS_BYTES: usize = 32;

/// Mode used for OPEN when the client sends no permissions.
pub const DEFAULT_FILE_PERM: u32 = 0o666;

/// Mode used for MKDIR when the client sends no permissions.
pub const DEFAULT_DIR_PERM: u32 = 0o777;

/// Client-supplied permissions are masked to the low nine bits before they
/// reach chmod or mkdir; file-type bits are never honored on write.
pub const PERM_MASK: u32 = 0o777;

/// SFTP message types (as defined in the SFTP specification)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Initialize SFTP session
    Init = 1,
    /// Version response
    Version = 2,
    /// Open file
    Open = 3,
    /// Close file or directory handle
    Close = 4,
    /// Read from file
    Read = 5,
    /// Write to file
    Write = 6,
    /// Get file attributes by path (do not follow symlinks)
    Lstat = 7,
    /// Get file attributes by handle
    Fstat = 8,
    /// Set file attributes by path
    Setstat = 9,
    /// Set file attributes by handle
    Fsetstat = 10,
    /// Open directory
    Opendir = 11,
    /// Read directory entries
    Readdir = 12,
    /// Remove file
    Remove = 13,
    /// Create directory
    Mkdir = 14,
    /// Remove directory
    Rmdir = 15,
    /// Canonicalize path
    Realpath = 16,
    /// Get file attributes by path (follow symlinks)
    Stat = 17,
    /// Rename file or directory
    Rename = 18,
    /// Read symbolic link target
    Readlink = 19,
    /// Create symbolic link
    Symlink = 20,
    /// Status response
    Status = 101,
    /// Handle response
    Handle = 102,
    /// Data response
    Data = 103,
    /// Name response (directory listings, REALPATH, READLINK)
    Name = 104,
    /// Attributes response
    Attrs = 105,
    /// Extended request
    Extended = 200,
    /// Extended reply
    ExtendedReply = 201,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            1 => Ok(MessageType::Init),
            2 => Ok(MessageType::Version),
            3 => Ok(MessageType::Open),
            4 => Ok(MessageType::Close),
            5 => Ok(MessageType::Read),
            6 => Ok(MessageType::Write),
            7 => Ok(MessageType::Lstat),
            8 => Ok(MessageType::Fstat),
            9 => Ok(MessageType::Setstat),
            10 => Ok(MessageType::Fsetstat),
            11 => Ok(MessageType::Opendir),
            12 => Ok(MessageType::Readdir),
            13 => Ok(MessageType::Remove),
            14 => Ok(MessageType::Mkdir),
            15 => Ok(MessageType::Rmdir),
            16 => Ok(MessageType::Realpath),
            17 => Ok(MessageType::Stat),
            18 => Ok(MessageType::Rename),
            19 => Ok(MessageType::Readlink),
            20 => Ok(MessageType::Symlink),
            101 => Ok(MessageType::Status),
            102 => Ok(MessageType::Handle),
            103 => Ok(MessageType::Data),
            104 => Ok(MessageType::Name),
            105 => Ok(MessageType::Attrs),
            200 => Ok(MessageType::Extended),
            201 => Ok(MessageType::ExtendedReply),
            other => Err(other),
        }
    }
}

/// SFTP status codes
///
/// `NoConnection` and `ConnectionLost` exist on the wire but MUST NOT be
/// emitted by servers.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Success
    Ok = 0,
    /// End of file
    Eof = 1,
    /// No such file or directory
    NoSuchFile = 2,
    /// Permission denied
    PermissionDenied = 3,
    /// General failure
    Failure = 4,
    /// Bad message
    BadMessage = 5,
    /// No connection (client-only)
    NoConnection = 6,
    /// Connection lost (client-only)
    ConnectionLost = 7,
    /// Operation not supported
    OpUnsupported = 8,
}

impl StatusCode {
    /// Canned human-readable message carried in STATUS responses.
    pub fn message(self) -> &'static str {
        match self {
            StatusCode::Ok => "Success",
            StatusCode::Eof => "End of file",
            StatusCode::NoSuchFile => "No such file",
            StatusCode::PermissionDenied => "Permission denied",
            StatusCode::Failure => "Failure",
            StatusCode::BadMessage => "Bad message",
            StatusCode::OpUnsupported => "Operation unsupported",
            _ => "Unknown error",
        }
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> u32 {
        code as u32
    }
}

/// Portable file open flags carried by OPEN requests
#[derive(Debug, Clone, Copy)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    /// Open for reading
    pub const READ: u32 = 0x00000001;
    /// Open for writing
    pub const WRITE: u32 = 0x00000002;
    /// Writes append (not folded into the host flags; clients position
    /// writes with explicit offsets)
    pub const APPEND: u32 = 0x00000004;
    /// Create if missing
    pub const CREAT: u32 = 0x00000008;
    /// Truncate to zero length
    pub const TRUNC: u32 = 0x00000010;
    /// Fail if the file already exists
    pub const EXCL: u32 = 0x00000020;

    /// READ bit is set
    pub fn has_read(&self) -> bool {
        self.0 & Self::READ != 0
    }

    /// WRITE bit is set
    pub fn has_write(&self) -> bool {
        self.0 & Self::WRITE != 0
    }

    /// APPEND bit is set
    pub fn has_append(&self) -> bool {
        self.0 & Self::APPEND != 0
    }

    /// CREAT bit is set
    pub fn has_creat(&self) -> bool {
        self.0 & Self::CREAT != 0
    }

    /// TRUNC bit is set
    pub fn has_trunc(&self) -> bool {
        self.0 & Self::TRUNC != 0
    }

    /// EXCL bit is set
    pub fn has_excl(&self) -> bool {
        self.0 & Self::EXCL != 0
    }
}

/// File attributes (the protocol's flags-gated ATTRS record)
///
/// A field is `Some` exactly when the corresponding flag bit is present on
/// the wire. `uid`/`gid` and `atime`/`mtime` travel as pairs under a single
/// flag each, so they are always set or cleared together.
#[derive(Debug, Clone, Default)]
pub struct FileAttrs {
    /// File size in bytes (SSH_FILEXFER_ATTR_SIZE)
    pub size: Option<u64>,
    /// Owning user id (SSH_FILEXFER_ATTR_UIDGID)
    pub uid: Option<u32>,
    /// Owning group id (SSH_FILEXFER_ATTR_UIDGID)
    pub gid: Option<u32>,
    /// Full st_mode including file-type bits (SSH_FILEXFER_ATTR_PERMISSIONS)
    pub permissions: Option<u32>,
    /// Access time, whole seconds (SSH_FILEXFER_ATTR_ACMODTIME)
    pub atime: Option<u32>,
    /// Modification time, whole seconds (SSH_FILEXFER_ATTR_ACMODTIME)
    pub mtime: Option<u32>,
}

impl FileAttrs {
    const FLAG_SIZE: u32 = 0x00000001;
    const FLAG_UIDGID: u32 = 0x00000002;
    const FLAG_PERMISSIONS: u32 = 0x00000004;
    const FLAG_ACMODTIME: u32 = 0x00000008;
    const FLAG_EXTENDED: u32 = 0x80000000;

    /// Encode into the output packet: flags, then each present field in
    /// wire order. Never emits the EXTENDED flag.
    pub fn encode_into(&self, w: &mut PacketWriter) {
        let mut flags = 0u32;

        if self.size.is_some() {
            flags |= Self::FLAG_SIZE;
        }
        if self.uid.is_some() && self.gid.is_some() {
            flags |= Self::FLAG_UIDGID;
        }
        if self.permissions.is_some() {
            flags |= Self::FLAG_PERMISSIONS;
        }
        if self.atime.is_some() && self.mtime.is_some() {
            flags |= Self::FLAG_ACMODTIME;
        }

        w.put_u32(flags);

        if let Some(size) = self.size {
            w.put_u64(size);
        }
        if let (Some(uid), Some(gid)) = (self.uid, self.gid) {
            w.put_u32(uid);
            w.put_u32(gid);
        }
        if let Some(permissions) = self.permissions {
            w.put_u32(permissions);
        }
        if let (Some(atime), Some(mtime)) = (self.atime, self.mtime) {
            w.put_u32(atime);
            w.put_u32(mtime);
        }
    }

    /// Decode from the input packet. EXTENDED (type, data) pairs are
    /// consumed and discarded.
    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self> {
        let flags = r.get_u32()?;
        let mut attrs = FileAttrs::default();

        if flags & Self::FLAG_SIZE != 0 {
            attrs.size = Some(r.get_u64()?);
        }
        if flags & Self::FLAG_UIDGID != 0 {
            attrs.uid = Some(r.get_u32()?);
            attrs.gid = Some(r.get_u32()?);
        }
        if flags & Self::FLAG_PERMISSIONS != 0 {
            attrs.permissions = Some(r.get_u32()?);
        }
        if flags & Self::FLAG_ACMODTIME != 0 {
            attrs.atime = Some(r.get_u32()?);
            attrs.mtime = Some(r.get_u32()?);
        }
        if flags & Self::FLAG_EXTENDED != 0 {
            let count = r.get_u32()?;
            for _ in 0..count {
                r.get_string()?;
                r.get_string()?;
            }
        }

        Ok(attrs)
    }
}
