use std::os::fd::OwnedFd;

use crate::connection::memory;
use crate::object::{Access, Interface, Object, Property};
use crate::{Connection, Message, ObjectPath, Serial, Signature, Transport, Value};

fn service() -> Object {
    Object::new()
        .with_interface(
            "org.example.Calc",
            Interface::new()
                .with_method("Add", Signature::new("ii").unwrap(), Signature::INT32, |call| {
                    let mut body = call.body();
                    let a = body.load::<i32>()?;
                    let b = body.load::<i32>()?;

                    let mut reply = call.method_return()?;
                    reply.body_mut().store(a + b)?;
                    Ok(reply)
                })
                .with_method("Boom", Signature::EMPTY, Signature::EMPTY, |_| {
                    panic!("handler exploded")
                })
                .with_signal("Computed", Signature::INT32)
                .with_property(
                    "Precision",
                    Property::new(Signature::UINT32, Access::ReadWrite, Value::Uint32(2)).unwrap(),
                )
                .with_property(
                    "Version",
                    Property::new(
                        Signature::STRING,
                        Access::Read,
                        Value::from("1.0"),
                    )
                    .unwrap(),
                ),
        )
        .with_interface(
            "org.example.Aux",
            Interface::new().with_method("Unique", Signature::EMPTY, Signature::EMPTY, |call| {
                call.method_return()
            }),
        )
}

fn exported() -> (Connection, Box<dyn Transport>) {
    let (ours, theirs) = memory::pair();
    let connection = Connection::from_transport(Box::new(ours)).unwrap();

    connection
        .export(ObjectPath::new_const(b"/svc"), service())
        .unwrap();

    (connection, Box::new(theirs))
}

fn read_exact(peer: &mut dyn Transport, total: usize, buf: &mut Vec<u8>) {
    let mut chunk = [0u8; 1024];
    let mut fds = Vec::<OwnedFd>::new();

    while buf.len() < total {
        let want = (total - buf.len()).min(chunk.len());
        let count = peer.recv(&mut chunk[..want], &mut fds).unwrap();
        assert!(count > 0, "peer saw unexpected eof");
        buf.extend_from_slice(&chunk[..count]);
    }
}

fn peer_read(peer: &mut dyn Transport) -> Message {
    let mut buf = Vec::new();
    read_exact(peer, 16, &mut buf);
    let total = Message::frame_length(&buf).unwrap();
    read_exact(peer, total, &mut buf);
    Message::parse_from_bytes(&buf).unwrap().0
}

/// Send `call` in, dispatch it, and read the reply out.
fn round_trip(connection: &Connection, peer: &mut dyn Transport, call: &Message) -> Message {
    let frame = call
        .serialize_to_bytes(Serial::from_u32(11).unwrap())
        .unwrap();
    peer.send_all(&frame, &[]).unwrap();

    connection.read_and_dispatch(None).unwrap();
    peer_read(peer)
}

#[test]
fn method_dispatch_and_reply() {
    let (connection, mut peer) = exported();

    let mut call = Message::method_call(ObjectPath::new_const(b"/svc"), "Add")
        .with_interface("org.example.Calc")
        .with_sender(":1.4");
    call.body_mut().store(2i32).unwrap();
    call.body_mut().store(3i32).unwrap();

    let reply = round_trip(&connection, &mut *peer, &call);
    assert_eq!(reply.body().load::<i32>().unwrap(), 5);
    assert_eq!(reply.destination(), Some(":1.4"));
}

#[test]
fn signature_mismatch_is_invalid_args() {
    let (connection, mut peer) = exported();

    let mut call = Message::method_call(ObjectPath::new_const(b"/svc"), "Add")
        .with_interface("org.example.Calc");
    call.body_mut().store("two").unwrap();

    let reply = round_trip(&connection, &mut *peer, &call);
    assert_eq!(
        reply.error_name(),
        Some("org.freedesktop.DBus.Error.InvalidArgs")
    );
}

#[test]
fn unique_member_found_without_interface() {
    let (connection, mut peer) = exported();

    let call = Message::method_call(ObjectPath::new_const(b"/svc"), "Unique");
    let reply = round_trip(&connection, &mut *peer, &call);
    assert!(reply.error_name().is_none());

    // "Add" is unique too, but an unknown member is not found anywhere.
    let call = Message::method_call(ObjectPath::new_const(b"/svc"), "Missing");
    let reply = round_trip(&connection, &mut *peer, &call);
    assert_eq!(
        reply.error_name(),
        Some("org.freedesktop.DBus.Error.UnknownMethod")
    );
}

#[test]
fn unknown_interface_reported() {
    let (connection, mut peer) = exported();

    let call = Message::method_call(ObjectPath::new_const(b"/svc"), "Add")
        .with_interface("org.example.Nope");

    let reply = round_trip(&connection, &mut *peer, &call);
    assert_eq!(
        reply.error_name(),
        Some("org.freedesktop.DBus.Error.UnknownInterface")
    );
}

#[test]
fn panicking_handler_becomes_failed_reply() {
    let (connection, mut peer) = exported();

    let call = Message::method_call(ObjectPath::new_const(b"/svc"), "Boom")
        .with_interface("org.example.Calc");

    let reply = round_trip(&connection, &mut *peer, &call);
    assert_eq!(reply.error_name(), Some("org.freedesktop.DBus.Error.Failed"));
    assert!(connection.is_connected());
}

#[test]
fn properties_get_set_get_all() {
    let (connection, mut peer) = exported();

    let mut get = Message::method_call(ObjectPath::new_const(b"/svc"), "Get")
        .with_interface("org.freedesktop.DBus.Properties");
    get.body_mut().store("org.example.Calc").unwrap();
    get.body_mut().store("Precision").unwrap();

    let reply = round_trip(&connection, &mut *peer, &get);
    let value = reply.body().load_value().unwrap();
    assert_eq!(value.as_variant().unwrap().as_u32().unwrap(), 2);

    let mut set = Message::method_call(ObjectPath::new_const(b"/svc"), "Set")
        .with_interface("org.freedesktop.DBus.Properties");
    set.body_mut().store("org.example.Calc").unwrap();
    set.body_mut().store("Precision").unwrap();
    set.body_mut()
        .store_value(&Value::Uint32(6).into_variant())
        .unwrap();

    let reply = round_trip(&connection, &mut *peer, &set);
    assert!(reply.error_name().is_none());

    let reply = round_trip(&connection, &mut *peer, &get);
    let value = reply.body().load_value().unwrap();
    assert_eq!(value.as_variant().unwrap().as_u32().unwrap(), 6);

    let mut get_all = Message::method_call(ObjectPath::new_const(b"/svc"), "GetAll")
        .with_interface("org.freedesktop.DBus.Properties");
    get_all.body_mut().store("org.example.Calc").unwrap();

    let reply = round_trip(&connection, &mut *peer, &get_all);
    let value = reply.body().load_value().unwrap();
    let entries = value.as_array().unwrap();
    assert_eq!(entries.len(), 2);
}

#[test]
fn read_only_property_rejects_writes() {
    let (connection, mut peer) = exported();

    let mut set = Message::method_call(ObjectPath::new_const(b"/svc"), "Set")
        .with_interface("org.freedesktop.DBus.Properties");
    set.body_mut().store("org.example.Calc").unwrap();
    set.body_mut().store("Version").unwrap();
    set.body_mut()
        .store_value(&Value::from("2.0").into_variant())
        .unwrap();

    let reply = round_trip(&connection, &mut *peer, &set);
    assert_eq!(
        reply.error_name(),
        Some("org.freedesktop.DBus.Error.PropertyReadOnly")
    );
}

#[test]
fn wrongly_typed_property_write_is_invalid_args() {
    let (connection, mut peer) = exported();

    let mut set = Message::method_call(ObjectPath::new_const(b"/svc"), "Set")
        .with_interface("org.freedesktop.DBus.Properties");
    set.body_mut().store("org.example.Calc").unwrap();
    set.body_mut().store("Precision").unwrap();
    set.body_mut()
        .store_value(&Value::from("six").into_variant())
        .unwrap();

    let reply = round_trip(&connection, &mut *peer, &set);
    assert_eq!(
        reply.error_name(),
        Some("org.freedesktop.DBus.Error.InvalidArgs")
    );
}

#[test]
fn introspection_describes_the_object() {
    let (connection, mut peer) = exported();

    connection
        .export(ObjectPath::new_const(b"/svc/child"), Object::new())
        .unwrap();

    let call = Message::method_call(ObjectPath::new_const(b"/svc"), "Introspect")
        .with_interface("org.freedesktop.DBus.Introspectable");

    let reply = round_trip(&connection, &mut *peer, &call);
    let xml = reply.body().load::<&str>().unwrap();

    assert!(xml.contains("<interface name=\"org.example.Calc\">"));
    assert!(xml.contains("<method name=\"Add\">"));
    assert!(xml.contains("<signal name=\"Computed\">"));
    assert!(xml.contains("<property name=\"Precision\" type=\"u\" access=\"readwrite\"/>"));
    assert!(xml.contains("<node name=\"child\"/>"));
}

#[test]
fn ping_answers_empty() {
    let (connection, mut peer) = exported();

    let call = Message::method_call(ObjectPath::new_const(b"/svc"), "Ping")
        .with_interface("org.freedesktop.DBus.Peer");

    let reply = round_trip(&connection, &mut *peer, &call);
    assert!(reply.error_name().is_none());
    assert!(reply.signature().is_empty());
}

#[test]
fn export_twice_fails_and_unexport_clears() {
    let (connection, _peer) = exported();

    assert!(connection
        .export(ObjectPath::new_const(b"/svc"), Object::new())
        .is_err());

    assert!(connection.unexport(ObjectPath::new_const(b"/svc")));
    assert!(!connection.unexport(ObjectPath::new_const(b"/svc")));

    assert!(connection
        .export(ObjectPath::new_const(b"/svc"), Object::new())
        .is_ok());
}
