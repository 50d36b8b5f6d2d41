//! Shared harness for driving a session through raw request payloads and
//! picking apart the response frames it produces.

#![allow(dead_code)]

use petrel_sftp::Session;
use petrel_sftp::packet::{PacketReader, PacketWriter};
use petrel_sftp::protocol::{FileAttrs, MessageType};

/// Process one request payload exactly the way the serve loop does,
/// returning the complete response frame (length header included), or an
/// empty vector when the request produced no response.
pub fn exchange(session: &mut Session, payload: &[u8]) -> Vec<u8> {
    let mut out = PacketWriter::new();
    let frame_len = out.mark();
    out.put_u32(0);
    session.handle_packet(payload, &mut out).unwrap();

    let payload_len = out.len() - 4;
    if payload_len == 0 {
        return Vec::new();
    }
    out.patch_u32(frame_len, payload_len as u32);
    out.as_slice().to_vec()
}

/// Perform the version handshake, asserting the exact VERSION frame.
pub fn init(session: &mut Session) {
    let frame = exchange(session, &[1, 0, 0, 0, 3]);
    assert_eq!(frame, [0, 0, 0, 5, 2, 0, 0, 0, 3]);
}

/// Request payload builder.
pub struct Req(Vec<u8>);

impl Req {
    pub fn new(msg: MessageType, id: u32) -> Self {
        let mut buf = vec![msg as u8];
        buf.extend_from_slice(&id.to_be_bytes());
        Self(buf)
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn string(mut self, s: &[u8]) -> Self {
        self.0.extend_from_slice(&(s.len() as u32).to_be_bytes());
        self.0.extend_from_slice(s);
        self
    }

    pub fn path(self, p: &std::path::Path) -> Self {
        use std::os::unix::ffi::OsStrExt;
        self.string(p.as_os_str().as_bytes())
    }

    /// Empty ATTRS record (flags = 0).
    pub fn no_attrs(self) -> Self {
        self.u32(0)
    }

    /// ATTRS record carrying only permissions.
    pub fn perm_attrs(self, mode: u32) -> Self {
        self.u32(0x4).u32(mode)
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }
}

/// Split a response frame into its payload, verifying the length header.
pub fn payload(frame: &[u8]) -> &[u8] {
    assert!(frame.len() >= 4, "frame shorter than its length header");
    let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(len, frame.len() - 4, "length header does not match frame");
    &frame[4..]
}

fn reader(frame: &[u8]) -> PacketReader<'_> {
    PacketReader::new(payload(frame))
}

/// Assert a STATUS response and return its code.
pub fn expect_status(frame: &[u8], id: u32) -> u32 {
    let mut r = reader(frame);
    assert_eq!(r.get_u8().unwrap(), MessageType::Status as u8);
    assert_eq!(r.get_u32().unwrap(), id, "status echoes the wrong id");
    let code = r.get_u32().unwrap();
    let message = r.get_string().unwrap().to_vec();
    assert_eq!(r.get_string().unwrap(), b"en");
    assert_eq!(r.remaining(), 0);

    let expected: &[u8] = match code {
        0 => b"Success",
        1 => b"End of file",
        2 => b"No such file",
        3 => b"Permission denied",
        4 => b"Failure",
        5 => b"Bad message",
        8 => b"Operation unsupported",
        _ => b"Unknown error",
    };
    assert_eq!(message, expected);
    code
}

/// Assert a HANDLE response and return the wire handle.
pub fn expect_handle(frame: &[u8], id: u32) -> Vec<u8> {
    let mut r = reader(frame);
    assert_eq!(r.get_u8().unwrap(), MessageType::Handle as u8);
    assert_eq!(r.get_u32().unwrap(), id);
    let handle = r.get_string().unwrap().to_vec();
    assert_eq!(handle.len(), 2, "wire handles are two digits");
    assert!(handle.iter().all(u8::is_ascii_digit));
    assert_eq!(r.remaining(), 0);
    handle
}

/// Assert a DATA response and return its bytes.
pub fn expect_data(frame: &[u8], id: u32) -> Vec<u8> {
    let mut r = reader(frame);
    assert_eq!(r.get_u8().unwrap(), MessageType::Data as u8);
    assert_eq!(r.get_u32().unwrap(), id);
    let data = r.get_data().unwrap().to_vec();
    assert_eq!(r.remaining(), 0);
    data
}

/// Assert an ATTRS response and return the decoded record.
pub fn expect_attrs(frame: &[u8], id: u32) -> FileAttrs {
    let mut r = reader(frame);
    assert_eq!(r.get_u8().unwrap(), MessageType::Attrs as u8);
    assert_eq!(r.get_u32().unwrap(), id);
    let attrs = FileAttrs::decode(&mut r).unwrap();
    assert_eq!(r.remaining(), 0);
    attrs
}

/// Assert a NAME response and return (filename, long-name, attrs) triples.
pub fn expect_name(frame: &[u8], id: u32) -> Vec<(Vec<u8>, Vec<u8>, FileAttrs)> {
    let mut r = reader(frame);
    assert_eq!(r.get_u8().unwrap(), MessageType::Name as u8);
    assert_eq!(r.get_u32().unwrap(), id);
    let count = r.get_u32().unwrap();
    let mut entries = Vec::new();
    for _ in 0..count {
        let filename = r.get_string().unwrap().to_vec();
        let longname = r.get_string().unwrap().to_vec();
        let attrs = FileAttrs::decode(&mut r).unwrap();
        entries.push((filename, longname, attrs));
    }
    assert_eq!(r.remaining(), 0);
    entries
}
