//! Protocol encoding/decoding tests for the wire primitives and the
//! composite ATTRS record.

use petrel_sftp::packet::{PacketReader, PacketWriter};
use petrel_sftp::protocol::{
    FileAttrs, MAX_ATTRS_BYTES, MessageType, OpenFlags, SFTP_VERSION, StatusCode,
};

#[test]
fn all_message_type_conversions() {
    // Request types
    assert_eq!(MessageType::try_from(1).unwrap(), MessageType::Init);
    assert_eq!(MessageType::try_from(3).unwrap(), MessageType::Open);
    assert_eq!(MessageType::try_from(4).unwrap(), MessageType::Close);
    assert_eq!(MessageType::try_from(5).unwrap(), MessageType::Read);
    assert_eq!(MessageType::try_from(6).unwrap(), MessageType::Write);
    assert_eq!(MessageType::try_from(7).unwrap(), MessageType::Lstat);
    assert_eq!(MessageType::try_from(8).unwrap(), MessageType::Fstat);
    assert_eq!(MessageType::try_from(9).unwrap(), MessageType::Setstat);
    assert_eq!(MessageType::try_from(10).unwrap(), MessageType::Fsetstat);
    assert_eq!(MessageType::try_from(11).unwrap(), MessageType::Opendir);
    assert_eq!(MessageType::try_from(12).unwrap(), MessageType::Readdir);
    assert_eq!(MessageType::try_from(13).unwrap(), MessageType::Remove);
    assert_eq!(MessageType::try_from(14).unwrap(), MessageType::Mkdir);
    assert_eq!(MessageType::try_from(15).unwrap(), MessageType::Rmdir);
    assert_eq!(MessageType::try_from(16).unwrap(), MessageType::Realpath);
    assert_eq!(MessageType::try_from(17).unwrap(), MessageType::Stat);
    assert_eq!(MessageType::try_from(18).unwrap(), MessageType::Rename);
    assert_eq!(MessageType::try_from(19).unwrap(), MessageType::Readlink);
    assert_eq!(MessageType::try_from(20).unwrap(), MessageType::Symlink);

    // Response types
    assert_eq!(MessageType::try_from(2).unwrap(), MessageType::Version);
    assert_eq!(MessageType::try_from(101).unwrap(), MessageType::Status);
    assert_eq!(MessageType::try_from(102).unwrap(), MessageType::Handle);
    assert_eq!(MessageType::try_from(103).unwrap(), MessageType::Data);
    assert_eq!(MessageType::try_from(104).unwrap(), MessageType::Name);
    assert_eq!(MessageType::try_from(105).unwrap(), MessageType::Attrs);
}

#[test]
fn invalid_message_types_are_rejected() {
    assert!(MessageType::try_from(0).is_err());
    assert!(MessageType::try_from(21).is_err());
    assert!(MessageType::try_from(99).is_err());
    assert!(MessageType::try_from(100).is_err());
    assert!(MessageType::try_from(106).is_err());
    assert!(MessageType::try_from(255).is_err());
}

#[test]
fn status_code_values_and_messages() {
    assert_eq!(u32::from(StatusCode::Ok), 0);
    assert_eq!(u32::from(StatusCode::Eof), 1);
    assert_eq!(u32::from(StatusCode::NoSuchFile), 2);
    assert_eq!(u32::from(StatusCode::PermissionDenied), 3);
    assert_eq!(u32::from(StatusCode::Failure), 4);
    assert_eq!(u32::from(StatusCode::BadMessage), 5);
    assert_eq!(u32::from(StatusCode::NoConnection), 6);
    assert_eq!(u32::from(StatusCode::ConnectionLost), 7);
    assert_eq!(u32::from(StatusCode::OpUnsupported), 8);

    assert_eq!(StatusCode::Ok.message(), "Success");
    assert_eq!(StatusCode::Eof.message(), "End of file");
    assert_eq!(StatusCode::NoSuchFile.message(), "No such file");
    assert_eq!(StatusCode::PermissionDenied.message(), "Permission denied");
    assert_eq!(StatusCode::Failure.message(), "Failure");
    assert_eq!(StatusCode::BadMessage.message(), "Bad message");
    assert_eq!(StatusCode::OpUnsupported.message(), "Operation unsupported");
    assert_eq!(StatusCode::NoConnection.message(), "Unknown error");
}

#[test]
fn open_flag_predicates() {
    let rw = OpenFlags(OpenFlags::READ | OpenFlags::WRITE);
    assert!(rw.has_read());
    assert!(rw.has_write());
    assert!(!rw.has_creat());

    let create = OpenFlags(OpenFlags::WRITE | OpenFlags::CREAT | OpenFlags::TRUNC);
    assert!(create.has_write());
    assert!(create.has_creat());
    assert!(create.has_trunc());
    assert!(!create.has_excl());

    let excl = OpenFlags(OpenFlags::EXCL | OpenFlags::APPEND);
    assert!(excl.has_excl());
    assert!(excl.has_append());
    assert!(!excl.has_read());
}

#[test]
fn u32_serializes_big_endian() {
    // RFC 4251's own example: 699921578 is 29 b7 f4 aa
    let mut w = PacketWriter::new();
    w.put_u32(0x29b7_f4aa);
    assert_eq!(w.as_slice(), [0x29, 0xb7, 0xf4, 0xaa]);

    let mut r = PacketReader::new(w.as_slice());
    assert_eq!(r.get_u32().unwrap(), 699_921_578);
}

#[test]
fn u64_serializes_big_endian() {
    let mut w = PacketWriter::new();
    w.put_u64(0x0102_0304_0506_0708);
    assert_eq!(w.as_slice(), [1, 2, 3, 4, 5, 6, 7, 8]);

    let mut r = PacketReader::new(w.as_slice());
    assert_eq!(r.get_u64().unwrap(), 0x0102_0304_0506_0708);
}

#[test]
fn string_is_length_prefixed_and_unterminated() {
    // RFC 4251: "testing" is 00 00 00 07 t e s t i n g
    let mut w = PacketWriter::new();
    w.put_string(b"testing");
    assert_eq!(w.as_slice(), b"\x00\x00\x00\x07testing");

    // Strings are binary-safe, NULs included
    let mut w = PacketWriter::new();
    w.put_string(b"a\0b");
    assert_eq!(w.as_slice(), b"\x00\x00\x00\x03a\0b");
    let mut r = PacketReader::new(w.as_slice());
    assert_eq!(r.get_string().unwrap(), b"a\0b");
}

#[test]
fn empty_attrs_encode_as_zero_flags() {
    let mut w = PacketWriter::new();
    FileAttrs::default().encode_into(&mut w);
    assert_eq!(w.as_slice(), [0, 0, 0, 0]);
}

#[test]
fn full_attrs_fill_exactly_the_reserved_bound() {
    let attrs = FileAttrs {
        size: Some(1),
        uid: Some(2),
        gid: Some(3),
        permissions: Some(0o100644),
        atime: Some(4),
        mtime: Some(5),
    };
    let mut w = PacketWriter::new();
    attrs.encode_into(&mut w);
    assert_eq!(w.len(), MAX_ATTRS_BYTES);
}

#[test]
fn attrs_roundtrip_preserves_present_fields() {
    let attrs = FileAttrs {
        size: Some(987_654_321_000),
        uid: None,
        gid: None,
        permissions: Some(0o40755),
        atime: Some(1_700_000_000),
        mtime: Some(1_700_000_001),
    };
    let mut w = PacketWriter::new();
    attrs.encode_into(&mut w);

    let mut r = PacketReader::new(w.as_slice());
    let decoded = FileAttrs::decode(&mut r).unwrap();
    assert_eq!(decoded.size, Some(987_654_321_000));
    assert_eq!(decoded.uid, None);
    assert_eq!(decoded.gid, None);
    assert_eq!(decoded.permissions, Some(0o40755));
    assert_eq!(decoded.atime, Some(1_700_000_000));
    assert_eq!(decoded.mtime, Some(1_700_000_001));
    assert_eq!(r.remaining(), 0);
}

#[test]
fn attrs_decode_consumes_extended_pairs() {
    let mut payload = Vec::new();
    payload.extend_from_slice(&0x8000_0001u32.to_be_bytes()); // SIZE | EXTENDED
    payload.extend_from_slice(&42u64.to_be_bytes());
    payload.extend_from_slice(&2u32.to_be_bytes()); // two pairs
    for pair in [("one", "1"), ("two", "22")] {
        payload.extend_from_slice(&(pair.0.len() as u32).to_be_bytes());
        payload.extend_from_slice(pair.0.as_bytes());
        payload.extend_from_slice(&(pair.1.len() as u32).to_be_bytes());
        payload.extend_from_slice(pair.1.as_bytes());
    }
    payload.extend_from_slice(&0xdead_beefu32.to_be_bytes()); // sentinel after attrs

    let mut r = PacketReader::new(&payload);
    let attrs = FileAttrs::decode(&mut r).unwrap();
    assert_eq!(attrs.size, Some(42));
    // The pairs are gone and the cursor sits just past the record
    assert_eq!(r.get_u32().unwrap(), 0xdead_beef);
}

#[test]
fn attrs_decode_rejects_truncation() {
    // SIZE flag announced but no size field follows
    let payload = 0x1u32.to_be_bytes();
    let mut r = PacketReader::new(&payload);
    assert!(FileAttrs::decode(&mut r).is_err());
}

#[test]
fn version_constant_is_three() {
    assert_eq!(SFTP_VERSION, 3);
}
