use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::connection::memory;
use crate::proto::Flags;
use crate::{
    Connection, DispatchStatus, Interface, Message, Object, ObjectPath, Serial, Signature,
    SignalMatch, Transport,
};

fn connected() -> (Connection, Box<dyn Transport>) {
    let (ours, theirs) = memory::pair();
    let connection = Connection::from_transport(Box::new(ours)).unwrap();
    (connection, Box::new(theirs))
}

fn read_exact(peer: &mut dyn Transport, total: usize, buf: &mut Vec<u8>, fds: &mut Vec<OwnedFd>) {
    let mut chunk = [0u8; 1024];

    while buf.len() < total {
        let want = (total - buf.len()).min(chunk.len());
        let count = peer.recv(&mut chunk[..want], fds).unwrap();
        assert!(count > 0, "peer saw unexpected eof");
        buf.extend_from_slice(&chunk[..count]);
    }
}

/// Read one whole message on the far side of the transport.
fn peer_read(peer: &mut dyn Transport) -> Message {
    let mut buf = Vec::new();
    let mut fds = Vec::new();

    read_exact(peer, 16, &mut buf, &mut fds);
    let total = Message::frame_length(&buf).unwrap();
    read_exact(peer, total, &mut buf, &mut fds);

    let (mut message, consumed) = Message::parse_from_bytes(&buf).unwrap();
    assert_eq!(consumed, total);
    message.attach_fds(fds).unwrap();
    message
}

fn peer_send(peer: &mut dyn Transport, message: &Message, serial: u32) {
    let frame = message
        .serialize_to_bytes(Serial::from_u32(serial).unwrap())
        .unwrap();
    peer.send_all(&frame, &[]).unwrap();
}

#[test]
fn reply_completes_pending_call() {
    let (connection, mut peer) = connected();

    let call = connection
        .send_with_reply(
            Message::method_call(ObjectPath::new_const(b"/o"), "Add"),
            None,
        )
        .unwrap();

    let serial = call.serial();
    assert!(connection.pending().contains(serial));

    let inbound = peer_read(&mut *peer);
    assert_eq!(inbound.member(), Some("Add"));

    let mut reply = inbound.method_return().unwrap();
    reply.body_mut().store(99u32).unwrap();
    peer_send(&mut *peer, &reply, 1);

    assert_eq!(
        connection.read_and_dispatch(None).unwrap(),
        DispatchStatus::Dispatched(1)
    );

    let reply = call.try_wait().unwrap().expect("reply should be in");
    assert_eq!(reply.body().load::<u32>().unwrap(), 99);
    assert!(!connection.pending().contains(serial));
}

#[test]
fn no_reply_call_registers_nothing() {
    let (connection, mut peer) = connected();

    let mut message = Message::method_call(ObjectPath::new_const(b"/o"), "Notify");
    message.set_no_reply(true);

    connection.send_one_way(&message).unwrap();
    assert_eq!(connection.pending().len(), 0);

    let inbound = peer_read(&mut *peer);
    assert!(inbound.flags().contains(Flags::NO_REPLY_EXPECTED));

    // A reply built for such a call is born invalidated and a send of it
    // is a silent no-op.
    let reply = inbound.method_return().unwrap();
    assert!(!reply.is_valid());
    assert_eq!(connection.send_one_way(&reply).unwrap(), None);
}

#[test]
fn unexported_path_yields_unknown_object() {
    let (connection, mut peer) = connected();

    let call = Message::method_call(ObjectPath::new_const(b"/not/there"), "Frob")
        .with_sender(":1.2");
    peer_send(&mut *peer, &call, 9);

    connection.read_and_dispatch(None).unwrap();

    let reply = peer_read(&mut *peer);
    assert_eq!(
        reply.error_name(),
        Some("org.freedesktop.DBus.Error.UnknownObject")
    );
    assert_eq!(reply.reply_serial(), Some(Serial::from_u32(9).unwrap()));
}

#[test]
fn unparseable_frame_disconnects() {
    let (connection, mut peer) = connected();

    let call = connection
        .send_with_reply(
            Message::method_call(ObjectPath::new_const(b"/o"), "Stalled"),
            None,
        )
        .unwrap();

    // A prologue with a bogus endianness marker cannot be framed.
    peer.send_all(&[0xff; 16], &[]).unwrap();

    assert!(connection.read_and_dispatch(None).is_err());
    assert!(!connection.is_connected());
    assert!(call.wait(None).unwrap_err().is_disconnected());
}

#[test]
fn send_blocking_drives_the_read_path() {
    let (connection, mut peer) = connected();

    let responder = std::thread::spawn(move || {
        let inbound = peer_read(&mut *peer);
        let mut reply = inbound.method_return().unwrap();
        reply.body_mut().store("pong").unwrap();
        peer_send(&mut *peer, &reply, 1);
    });

    let reply = connection
        .send_blocking(
            Message::method_call(ObjectPath::new_const(b"/o"), "Ping"),
            Some(Duration::from_secs(5)),
        )
        .unwrap();

    assert_eq!(reply.body().load::<&str>().unwrap(), "pong");
    responder.join().unwrap();
}

#[test]
fn serials_strictly_increase() {
    let (connection, mut peer) = connected();

    let first = connection
        .send_one_way(&Message::method_call(ObjectPath::new_const(b"/o"), "A"))
        .unwrap()
        .unwrap();
    let second = connection
        .send_one_way(&Message::method_call(ObjectPath::new_const(b"/o"), "B"))
        .unwrap()
        .unwrap();

    assert!(second > first);

    assert_eq!(peer_read(&mut *peer).serial(), Some(first));
    assert_eq!(peer_read(&mut *peer).serial(), Some(second));
}

#[test]
fn unknown_reply_serial_is_dropped() {
    let (connection, mut peer) = connected();

    let call = Message::method_call(ObjectPath::new_const(b"/o"), "M").with_serial(
        Serial::from_u32(77).unwrap(),
    );
    let reply = call.method_return().unwrap();
    peer_send(&mut *peer, &reply, 1);

    // The reply has no pending entry; dispatch drops it and carries on.
    assert_eq!(
        connection.read_and_dispatch(None).unwrap(),
        DispatchStatus::Dispatched(1)
    );
    assert!(connection.is_connected());
}

#[test]
fn pending_call_timeout_is_swept() {
    let (connection, _peer) = connected();

    let call = connection
        .send_with_reply(
            Message::method_call(ObjectPath::new_const(b"/o"), "Slow"),
            Some(Duration::from_millis(10)),
        )
        .unwrap();

    let err = call.wait(None).unwrap_err();
    assert!(err.is_timed_out());
    assert_eq!(connection.pending().len(), 0);
}

#[test]
fn signals_fan_out_to_matching_subscriptions() {
    let (connection, mut peer) = connected();

    let hits = Arc::new(AtomicUsize::new(0));

    let token = {
        let hits = hits.clone();

        connection
            .subscribe(SignalMatch::new("org.example", "Changed"), move |message| {
                assert_eq!(message.member(), Some("Changed"));
                hits.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
    };

    let strict = connection
        .subscribe(
            SignalMatch::new("org.example", "Changed").with_sender(":1.99"),
            |_| panic!("sender filter should not match"),
        )
        .unwrap();

    let signal = Message::signal(ObjectPath::new_const(b"/o"), "org.example", "Changed")
        .with_sender(":1.5");
    peer_send(&mut *peer, &signal, 4);

    connection.read_and_dispatch(None).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // A dropped token no longer receives anything.
    drop(token);
    peer_send(&mut *peer, &signal, 5);
    connection.read_and_dispatch(None).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    drop(strict);
}

#[test]
fn exported_object_answers_calls() {
    let (connection, mut peer) = connected();

    let object = Object::new().with_interface(
        "org.example.Echo",
        Interface::new().with_method(
            "Echo",
            Signature::STRING,
            Signature::STRING,
            |call| {
                let text = call.body().load::<&str>()?;
                let mut reply = call.method_return()?;
                reply.body_mut().store(text)?;
                Ok(reply)
            },
        ),
    );

    connection
        .export(ObjectPath::new_const(b"/svc"), object)
        .unwrap();

    let mut call = Message::method_call(ObjectPath::new_const(b"/svc"), "Echo")
        .with_interface("org.example.Echo")
        .with_sender(":1.3");
    call.body_mut().store("hi").unwrap();
    peer_send(&mut *peer, &call, 21);

    connection.read_and_dispatch(None).unwrap();

    let reply = peer_read(&mut *peer);
    assert_eq!(reply.reply_serial(), Some(Serial::from_u32(21).unwrap()));
    assert_eq!(reply.body().load::<&str>().unwrap(), "hi");
}

#[test]
fn dispatcher_thread_routes_replies() {
    let (connection, mut peer) = connected();
    let dispatcher = crate::Dispatcher::start(connection.clone());

    let responder = std::thread::spawn(move || {
        let inbound = peer_read(&mut *peer);
        let mut reply = inbound.method_return().unwrap();
        reply.body_mut().store(7u32).unwrap();
        peer_send(&mut *peer, &reply, 1);
    });

    let reply = connection
        .send_blocking(
            Message::method_call(ObjectPath::new_const(b"/o"), "Ping"),
            Some(Duration::from_secs(5)),
        )
        .unwrap();

    assert_eq!(reply.body().load::<u32>().unwrap(), 7);
    responder.join().unwrap();
    drop(dispatcher);
}

#[test]
fn disconnect_wakes_blocked_waiters() {
    let (connection, peer) = connected();

    let call = connection
        .send_with_reply(
            Message::method_call(ObjectPath::new_const(b"/o"), "Never"),
            None,
        )
        .unwrap();

    let waiter = std::thread::spawn(move || call.wait(None));

    std::thread::sleep(Duration::from_millis(20));
    drop(peer);
    connection.close();

    assert!(waiter.join().unwrap().unwrap_err().is_disconnected());
}
