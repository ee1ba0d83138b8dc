//! Client-side stubs targeting remote objects.

use std::fmt;
use std::time::Duration;

use crate::body_buf::BodyBuf;
use crate::connection::{check_reply, Connection, ConnectionHandle, SignalMatch, SignalToken};
use crate::error::Result;
use crate::message::Message;
use crate::object_path::{ObjectPath, ObjectPathBuf};
use crate::org_freedesktop_dbus::PROPERTIES;
use crate::pending::PendingCall;
use crate::value::Value;

/// A typed stub for one interface of a remote object.
///
/// A proxy holds the (destination, path, interface) triple and a
/// non-owning [`ConnectionHandle`]; calls through a proxy whose connection
/// has been torn down fail with `Disconnected`.
///
/// # Examples
///
/// ```no_run
/// use dbus_sync::{BodyBuf, Connection, ObjectPath, Proxy};
///
/// let connection = Connection::session_bus()?;
///
/// let proxy = Proxy::new(
///     &connection,
///     "org.freedesktop.DBus",
///     ObjectPath::new_const(b"/org/freedesktop/DBus"),
///     "org.freedesktop.DBus",
/// );
///
/// let mut args = BodyBuf::new();
/// args.store("org.freedesktop.DBus")?;
///
/// let reply = proxy.call("GetNameOwner", args)?;
/// let owner = reply.body().load::<&str>()?;
/// # Ok::<_, dbus_sync::Error>(())
/// ```
pub struct Proxy {
    connection: ConnectionHandle,
    destination: Box<str>,
    path: ObjectPathBuf,
    interface: Box<str>,
    timeout: Option<Duration>,
}

impl Proxy {
    /// The default timeout applied to proxy calls.
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

    /// Construct a proxy for the given remote interface.
    pub fn new(
        connection: &Connection,
        destination: &str,
        path: &ObjectPath,
        interface: &str,
    ) -> Self {
        Self {
            connection: connection.handle(),
            destination: destination.into(),
            path: path.to_owned(),
            interface: interface.into(),
            timeout: Some(Self::DEFAULT_TIMEOUT),
        }
    }

    /// Replace the call timeout; `None` waits indefinitely.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The destination bus name of the proxy.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The object path of the proxy.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// The interface of the proxy.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// The connection this proxy sends through.
    ///
    /// Fails with `Disconnected` once the connection has been dropped.
    pub fn connection(&self) -> Result<Connection> {
        self.connection.upgrade()
    }

    /// Construct a call message addressed at the proxied interface.
    pub fn method_call(&self, member: &str) -> Message {
        Message::method_call(&self.path, member)
            .with_interface(&self.interface)
            .with_destination(&self.destination)
    }

    /// Call a method and block for its reply.
    ///
    /// An error reply from the peer is surfaced as a `RemoteError`.
    pub fn call(&self, member: &str, args: BodyBuf) -> Result<Message> {
        let connection = self.connection()?;
        let message = self.method_call(member).with_body(args);
        check_reply(connection.send_blocking(message, self.timeout)?)
    }

    /// Call a method and return a handle to the pending reply.
    pub fn call_with_reply(&self, member: &str, args: BodyBuf) -> Result<PendingCall> {
        let connection = self.connection()?;
        let message = self.method_call(member).with_body(args);
        connection.send_with_reply(message, self.timeout)
    }

    /// Call a method without expecting a reply.
    pub fn call_no_reply(&self, member: &str, args: BodyBuf) -> Result<()> {
        let connection = self.connection()?;
        let mut message = self.method_call(member).with_body(args);
        message.set_no_reply(true);
        connection.send_one_way(&message)?;
        Ok(())
    }

    /// Read a property of the proxied interface through
    /// `org.freedesktop.DBus.Properties`.
    pub fn get_property(&self, name: &str) -> Result<Value> {
        let connection = self.connection()?;

        let mut message = Message::method_call(&self.path, "Get")
            .with_interface(PROPERTIES)
            .with_destination(&self.destination);

        message.body_mut().store(&*self.interface)?;
        message.body_mut().store(name)?;

        let reply = check_reply(connection.send_blocking(message, self.timeout)?)?;
        let value = reply.body().load_value()?;
        Ok(value.as_variant()?.clone())
    }

    /// Write a property of the proxied interface through
    /// `org.freedesktop.DBus.Properties`.
    pub fn set_property(&self, name: &str, value: Value) -> Result<()> {
        let connection = self.connection()?;

        let mut message = Message::method_call(&self.path, "Set")
            .with_interface(PROPERTIES)
            .with_destination(&self.destination);

        message.body_mut().store(&*self.interface)?;
        message.body_mut().store(name)?;
        message.body_mut().store_value(&value.into_variant())?;

        check_reply(connection.send_blocking(message, self.timeout)?)?;
        Ok(())
    }

    /// Subscribe a handler to a signal of the proxied interface.
    ///
    /// The subscription matches the proxy's interface and destination and
    /// lives until the returned token drops.
    pub fn match_signal<F>(&self, member: &str, handler: F) -> Result<SignalToken>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let connection = self.connection()?;
        let key = SignalMatch::new(&self.interface, member);
        connection.subscribe(key, handler)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("destination", &self.destination)
            .field("path", &self.path)
            .field("interface", &self.interface)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::OwnedFd;
    use std::time::Duration;

    use crate::connection::memory;
    use crate::{BodyBuf, Connection, Message, ObjectPath, Proxy, Transport};

    fn connected() -> (Connection, Box<dyn Transport>) {
        let (ours, theirs) = memory::pair();
        let connection = Connection::from_transport(Box::new(ours)).unwrap();
        (connection, Box::new(theirs))
    }

    fn peer_read(peer: &mut dyn Transport) -> Message {
        let mut buf = Vec::new();
        let mut fds = Vec::<OwnedFd>::new();
        let mut chunk = [0u8; 1024];

        loop {
            let total = if buf.len() < 16 {
                16
            } else {
                Message::frame_length(&buf).unwrap()
            };

            if buf.len() >= 16 && buf.len() >= total {
                return Message::parse_from_bytes(&buf).unwrap().0;
            }

            let want = (total - buf.len()).min(chunk.len());
            let count = peer.recv(&mut chunk[..want], &mut fds).unwrap();
            assert!(count > 0);
            buf.extend_from_slice(&chunk[..count]);
        }
    }

    fn proxy_for(connection: &Connection) -> Proxy {
        Proxy::new(
            connection,
            ":1.5",
            ObjectPath::new_const(b"/org/example/Obj"),
            "org.example.Iface",
        )
        .with_timeout(Some(Duration::from_secs(5)))
    }

    #[test]
    fn call_builds_an_addressed_message() {
        let (connection, _peer) = connected();
        let proxy = proxy_for(&connection);

        let message = proxy.method_call("Echo");
        assert_eq!(message.destination(), Some(":1.5"));
        assert_eq!(message.interface(), Some("org.example.Iface"));
        assert_eq!(message.path().unwrap(), "/org/example/Obj");
    }

    #[test]
    fn call_surfaces_error_replies_as_remote_errors() {
        let (connection, mut peer) = connected();
        let proxy = proxy_for(&connection);

        let responder = std::thread::spawn(move || {
            let inbound = peer_read(&mut *peer);
            let reply = inbound
                .error_reply("org.freedesktop.DBus.Error.Failed", Some("nope"))
                .unwrap();
            let frame = reply
                .serialize_to_bytes(crate::Serial::from_u32(1).unwrap())
                .unwrap();
            peer.send_all(&frame, &[]).unwrap();
        });

        let err = proxy.call("Echo", BodyBuf::new()).unwrap_err();
        let (name, text) = err.as_remote().unwrap();
        assert_eq!(name, "org.freedesktop.DBus.Error.Failed");
        assert_eq!(text, Some("nope"));
        responder.join().unwrap();
    }

    #[test]
    fn proxy_does_not_keep_the_connection_alive() {
        let (connection, _peer) = connected();
        let proxy = proxy_for(&connection);

        assert!(proxy.connection().is_ok());
        drop(connection);

        assert!(proxy.connection().unwrap_err().is_disconnected());
        assert!(proxy
            .call("Echo", BodyBuf::new())
            .unwrap_err()
            .is_disconnected());
    }
}
