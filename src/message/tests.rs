use std::fs::File;
use std::os::fd::OwnedFd;

use crate::proto::{Endianness, Flags};
use crate::{BodyBuf, Message, MessageKind, ObjectPath, Serial, Signature, Value};

fn serial(n: u32) -> Serial {
    Serial::from_u32(n).unwrap()
}

#[test]
fn call_wire_format() {
    let mut m = Message::method_call(ObjectPath::new_const(b"/o"), "Echo")
        .with_endianness(Endianness::Little)
        .with_interface("org.example")
        .with_destination(":1.5");

    m.body_mut().store("hi").unwrap();

    let frame = m.serialize_to_bytes(serial(7)).unwrap();

    assert_eq!(frame[0], 0x6c);
    assert_eq!(frame[1], 0x01);
    assert_eq!(frame[3], 0x01);
    assert_eq!(&frame[4..8], &[0x07, 0x00, 0x00, 0x00]);
    assert_eq!(&frame[8..12], &[0x07, 0x00, 0x00, 0x00]);
    assert_eq!(
        &frame[frame.len() - 7..],
        &[0x02, 0x00, 0x00, 0x00, b'h', b'i', 0x00]
    );
}

#[test]
fn signal_with_empty_array() {
    let mut body = BodyBuf::with_endianness(Endianness::Little);
    let array = crate::Array::new(Signature::INT32).unwrap();
    body.store_value(&Value::Array(array)).unwrap();

    assert_eq!(body.get(), &[0, 0, 0, 0]);

    let m = Message::signal(ObjectPath::new_const(b"/o"), "org.example", "Changed")
        .with_endianness(Endianness::Little)
        .with_body(body);

    let frame = m.serialize_to_bytes(serial(1)).unwrap();
    let (parsed, consumed) = Message::parse_from_bytes(&frame).unwrap();

    assert_eq!(consumed, frame.len());
    assert_eq!(parsed.signature(), "ai");

    let value = parsed.body().load_value().unwrap();
    assert!(value.as_array().unwrap().is_empty());
}

#[test]
fn round_trip() {
    let mut m = Message::method_call(ObjectPath::new_const(b"/org/example/Obj"), "Frobnicate")
        .with_interface("org.example.Iface")
        .with_destination(":1.5")
        .with_sender(":1.9")
        .with_flags(Flags::NO_AUTO_START);

    m.body_mut().store(42u32).unwrap();
    m.body_mut().store("hello").unwrap();

    let frame = m.serialize_to_bytes(serial(7)).unwrap();
    let (parsed, consumed) = Message::parse_from_bytes(&frame).unwrap();

    assert_eq!(consumed, frame.len());
    assert_eq!(parsed, m.with_serial(serial(7)));
}

#[test]
fn round_trip_big_endian() {
    let mut m = Message::method_call(ObjectPath::new_const(b"/o"), "M")
        .with_endianness(Endianness::Big);

    m.body_mut().store(513u32).unwrap();

    let frame = m.serialize_to_bytes(serial(3)).unwrap();
    assert_eq!(frame[0], b'B');

    let (parsed, _) = Message::parse_from_bytes(&frame).unwrap();
    assert_eq!(parsed.body().load::<u32>().unwrap(), 513);
}

#[test]
fn error_reply_round_trip() {
    let call = Message::method_call(ObjectPath::new_const(b"/o"), "M")
        .with_sender(":1.7")
        .with_serial(serial(5));

    let reply = call
        .error_reply("org.freedesktop.DBus.Error.Failed", Some("it broke"))
        .unwrap();

    assert!(reply.is_valid());
    assert_eq!(reply.destination(), Some(":1.7"));
    assert_eq!(reply.reply_serial(), Some(serial(5)));

    let frame = reply.serialize_to_bytes(serial(6)).unwrap();
    let (parsed, _) = Message::parse_from_bytes(&frame).unwrap();

    assert_eq!(
        parsed.error_name(),
        Some("org.freedesktop.DBus.Error.Failed")
    );
    assert_eq!(parsed.error_text(), Some("it broke"));
}

#[test]
fn reply_builders_follow_no_reply_flag() {
    let mut call = Message::method_call(ObjectPath::new_const(b"/o"), "M").with_serial(serial(1));
    call.set_no_reply(true);

    assert!(!call.expects_reply());

    let reply = call.method_return().unwrap();
    assert!(!reply.is_valid());

    let reply = call.error_reply("org.freedesktop.DBus.Error.Failed", None).unwrap();
    assert!(!reply.is_valid());
}

#[test]
fn expects_reply_only_for_calls() {
    let call = Message::method_call(ObjectPath::new_const(b"/o"), "M");
    assert!(call.expects_reply());

    let signal = Message::signal(ObjectPath::new_const(b"/o"), "org.example", "S");
    assert!(!signal.expects_reply());

    assert!(signal.method_return().is_err());
}

#[test]
fn signal_requires_interface() {
    let mut m = Message::signal(ObjectPath::new_const(b"/o"), "org.example", "S");
    m.interface = None;

    assert!(m.serialize_to_bytes(serial(1)).is_err());
}

#[test]
fn parse_missing_required_field() {
    let call = Message::method_call(ObjectPath::new_const(b"/o"), "M").with_serial(serial(1));
    let reply = call.method_return().unwrap();

    let mut frame = reply.serialize_to_bytes(serial(2)).unwrap();
    // Rewrite the type byte so the frame claims to be a method call, which
    // requires PATH and MEMBER fields a method return does not carry.
    frame[1] = 0x01;

    assert!(Message::parse_from_bytes(&frame).is_err());
}

#[test]
fn parse_rejects_zero_serial() {
    let m = Message::method_call(ObjectPath::new_const(b"/o"), "M");
    let mut frame = m.serialize_to_bytes(serial(1)).unwrap();

    for byte in &mut frame[8..12] {
        *byte = 0;
    }

    assert!(Message::parse_from_bytes(&frame).is_err());
}

#[test]
fn parse_rejects_truncated_frame() {
    let mut m = Message::method_call(ObjectPath::new_const(b"/o"), "M");
    m.body_mut().store("payload").unwrap();

    let frame = m.serialize_to_bytes(serial(1)).unwrap();
    assert!(Message::parse_from_bytes(&frame[..frame.len() - 3]).is_err());
}

#[test]
fn frame_length_rejects_oversized_message() {
    let mut prologue = [0u8; 16];
    prologue[0] = b'l';
    prologue[1] = 1;
    prologue[3] = 1;
    // A body length of 2^27 pushes the total over the 128 MiB limit.
    prologue[4..8].copy_from_slice(&(1u32 << 27).to_le_bytes());
    prologue[8] = 1;

    assert!(Message::frame_length(&prologue).is_err());
}

#[test]
fn fd_table_round_trip() {
    let fd = OwnedFd::from(File::open("/dev/null").unwrap());

    let mut m = Message::method_call(ObjectPath::new_const(b"/o"), "M");
    m.body_mut().store_fd(fd).unwrap();

    assert_eq!(m.fd_count(), 1);
    assert_eq!(m.signature(), "h");

    let frame = m.serialize_to_bytes(serial(1)).unwrap();
    let (mut parsed, _) = Message::parse_from_bytes(&frame).unwrap();

    assert_eq!(parsed.declared_fds, 1);
    assert!(parsed.attach_fds(Vec::new()).is_err());

    let fd = OwnedFd::from(File::open("/dev/null").unwrap());
    parsed.attach_fds(vec![fd]).unwrap();

    let value = parsed.body().load_value().unwrap();
    assert_eq!(value.as_fd_index().unwrap(), 0);

    assert!(parsed.take_fd(0).is_ok());
    assert!(parsed.take_fd(0).is_err());
}

#[test]
fn invalidated_message_kind() {
    let mut m = Message::method_call(ObjectPath::new_const(b"/o"), "M");
    assert!(m.is_valid());
    m.invalidate();
    assert!(!m.is_valid());
    assert!(matches!(m.kind(), MessageKind::MethodCall { .. }));
}
