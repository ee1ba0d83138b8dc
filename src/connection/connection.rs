use std::num::NonZeroU32;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};
use crate::message::{Message, MessageKind, Serial};
use crate::proto::MessageType;
use crate::object::{Object, ObjectRegistry};
use crate::object_path::ObjectPath;
use crate::org_freedesktop_dbus::{self, NameFlag, RequestNameReply};
use crate::pending::{PendingCall, PendingCalls};
use crate::proto::FRAME_PROLOGUE_LENGTH;

use super::{SignalMatch, Subscriptions, Transport};

/// The default timeout applied to bus housekeeping calls.
const METHOD_TIMEOUT: Duration = Duration::from_secs(25);

/// How long a blocking sender reads before re-checking its own deadline.
const READ_POLL: Duration = Duration::from_millis(250);

/// The outcome of a [`Connection::read_and_dispatch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// The given number of whole messages were read and dispatched.
    Dispatched(usize),
    /// The read timed out before a whole message arrived.
    TimedOut,
}

/// The write side of a connection: the serial counter and the transport
/// half frames are emitted on.
///
/// Serial assignment and frame emission share one lock so that frames hit
/// the transport in serial order.
struct WriteHalf {
    transport: Box<dyn Transport>,
    serial: u32,
}

impl WriteHalf {
    /// The next serial of this connection. Serials are strictly increasing
    /// and skip zero on wrap-around.
    fn next_serial(&mut self) -> Serial {
        loop {
            let Some(serial) = NonZeroU32::new(self.serial.wrapping_add(1)) else {
                self.serial = 1;
                continue;
            };

            self.serial = serial.get();
            break Serial::new(serial);
        }
    }
}

/// The read side of a connection: the transport half frames arrive on and
/// the partial-frame accumulator.
struct ReadHalf {
    transport: Box<dyn Transport>,
    /// Bytes of the frame currently being received.
    buf: Vec<u8>,
    /// Descriptors received alongside the current frame.
    fds: Vec<OwnedFd>,
    /// Total length of the current frame once the prologue is in.
    need: Option<usize>,
}

impl ReadHalf {
    /// Read until `n` bytes of the current frame are buffered.
    ///
    /// Returns `false` if the transport timed out first; progress is kept
    /// and the next call resumes where this one stopped.
    fn fill(&mut self, n: usize) -> Result<bool> {
        let mut chunk = [0u8; 4096];

        while self.buf.len() < n {
            let want = (n - self.buf.len()).min(chunk.len());

            match self.transport.recv(&mut chunk[..want], &mut self.fds) {
                Ok(0) => return Err(Error::new(ErrorKind::Disconnected)),
                Ok(count) => self.buf.extend_from_slice(&chunk[..count]),
                Err(error)
                    if matches!(
                        error.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(false);
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(true)
    }

    /// Read one whole frame, or `None` if the transport timed out first.
    fn read_frame(&mut self) -> Result<Option<(Vec<u8>, Vec<OwnedFd>)>> {
        let total = match self.need {
            Some(total) => total,
            None => {
                if !self.fill(FRAME_PROLOGUE_LENGTH)? {
                    return Ok(None);
                }

                let total = Message::frame_length(&self.buf)?;
                self.need = Some(total);
                total
            }
        };

        if !self.fill(total)? {
            return Ok(None);
        }

        self.need = None;
        Ok(Some((
            std::mem::take(&mut self.buf),
            std::mem::take(&mut self.fds),
        )))
    }
}

pub(crate) struct ConnectionInner {
    write: Mutex<WriteHalf>,
    read: Mutex<ReadHalf>,
    pending: PendingCalls,
    objects: ObjectRegistry,
    subscriptions: Subscriptions,
    connected: AtomicBool,
    unique_name: Mutex<Option<Box<str>>>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.pending.disconnect_all();

        if let Ok(half) = self.read.get_mut() {
            let _ = half.transport.shutdown();
        }

        if let Ok(half) = self.write.get_mut() {
            let _ = half.transport.shutdown();
        }
    }
}

/// A connection to a D-Bus peer, usable from many threads.
///
/// The write path (serial assignment and frame emission) and the read path
/// (frame parse and dispatch) are guarded by independent locks, so a thread
/// blocked in [`send_blocking`] never prevents another from reading.
///
/// Cloning is cheap and every clone refers to the same connection. The
/// transport is closed when the last clone drops, waking all pending
/// waiters with `Disconnected`.
///
/// [`send_blocking`]: Self::send_blocking
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Connect to the session bus, authenticate, and register with the
    /// daemon.
    pub fn session_bus() -> Result<Self> {
        super::ConnectionBuilder::new().session_bus().build()
    }

    /// Connect to the system bus, authenticate, and register with the
    /// daemon.
    pub fn system_bus() -> Result<Self> {
        super::ConnectionBuilder::new().system_bus().build()
    }

    /// Take over an already authenticated transport.
    ///
    /// The SASL prelude must have completed on the channel; the message
    /// layer starts immediately.
    pub fn from_transport(transport: Box<dyn Transport>) -> Result<Self> {
        let (reader, writer) = transport.split()?;

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                write: Mutex::new(WriteHalf {
                    transport: writer,
                    serial: 0,
                }),
                read: Mutex::new(ReadHalf {
                    transport: reader,
                    buf: Vec::new(),
                    fds: Vec::new(),
                    need: None,
                }),
                pending: PendingCalls::new(),
                objects: ObjectRegistry::new(),
                subscriptions: Subscriptions::new(),
                connected: AtomicBool::new(true),
                unique_name: Mutex::new(None),
            }),
        })
    }

    /// Test if the connection is usable.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// A non-owning handle to this connection.
    ///
    /// Handles are held by proxies; they do not keep the connection alive.
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The unique bus name assigned by the daemon, when registered.
    pub fn unique_name(&self) -> Option<Box<str>> {
        self.inner.unique_name.lock().unwrap().clone()
    }

    /// Send a message without expecting a reply.
    ///
    /// An unassigned message is given the next serial, which is returned.
    /// Invalidated messages are silently skipped.
    pub fn send_one_way(&self, message: &Message) -> Result<Option<Serial>> {
        if !message.is_valid() {
            return Ok(None);
        }

        if !self.is_connected() {
            return Err(Error::new(ErrorKind::Disconnected));
        }

        let fds = message.body_buf().raw_fds()?;
        let mut write = self.inner.write.lock().unwrap();
        let serial = message.serial().unwrap_or_else(|| write.next_serial());
        let frame = message.serialize_to_bytes(serial)?;

        if let Err(error) = write.transport.send_all(&frame, &fds) {
            drop(write);
            self.close();
            return Err(error.into());
        }

        Ok(Some(serial))
    }

    /// Send a method call and register a pending entry for its reply.
    ///
    /// The `NO_REPLY_EXPECTED` flag is cleared. The entry is registered
    /// before the frame is written, so a reply racing back on another
    /// thread always finds it. If the write fails after registration, the
    /// pending call completes with the transport error.
    pub fn send_with_reply(
        &self,
        mut message: Message,
        timeout: Option<Duration>,
    ) -> Result<PendingCall> {
        let MessageKind::MethodCall { .. } = message.kind() else {
            return Err(Error::new(ErrorKind::NotAMethodCall));
        };

        if !message.is_valid() {
            let serial = message
                .serial()
                .unwrap_or_else(|| Serial::from_u32(u32::MAX).unwrap());
            return Ok(PendingCall::cancelled(serial));
        }

        if !self.is_connected() {
            return Err(Error::new(ErrorKind::Disconnected));
        }

        message.set_no_reply(false);

        let fds = message.body_buf().raw_fds()?;
        let mut write = self.inner.write.lock().unwrap();
        let serial = write.next_serial();
        let frame = message.serialize_to_bytes(serial)?;

        let call = self.inner.pending.insert(serial, timeout);

        if let Err(error) = write.transport.send_all(&frame, &fds) {
            drop(write);
            self.inner.pending.fail(serial, error.kind());
            self.close();
        }

        Ok(call)
    }

    /// Send a method call and block until its reply arrives.
    ///
    /// Returns the reply, which is either a method return or an error
    /// reply; the peer decides. If no dispatcher thread is running, the
    /// calling thread reads and dispatches frames itself while it waits.
    pub fn send_blocking(&self, message: Message, timeout: Option<Duration>) -> Result<Message> {
        let call = self.send_with_reply(message, timeout)?;
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            if let Some(reply) = call.try_wait()? {
                return Ok(reply);
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();

                    if now >= deadline {
                        return call.wait(Some(Duration::ZERO));
                    }

                    (deadline - now).min(READ_POLL)
                }
                None => READ_POLL,
            };

            match self.inner.read.try_lock() {
                Ok(mut read) => {
                    read.transport.set_read_timeout(Some(remaining))?;

                    match self.dispatch_locked(&mut read, 1) {
                        Ok(_) => {}
                        // Teardown has already completed the pending call;
                        // the next try_wait observes it.
                        Err(error) if error.is_disconnected() => {}
                        Err(error) => return Err(error),
                    }
                }
                Err(_) => {
                    // Another thread is reading; park until it completes us.
                    call.park(remaining);
                }
            }
        }
    }

    /// Read and dispatch up to `budget` whole messages, default one.
    ///
    /// Replies are matched to their pending calls; method calls are routed
    /// through the object registry; signals fan out to subscriptions.
    /// Pending-call deadlines are swept on every pass. Reads honor the
    /// transport read timeout currently in effect.
    pub fn read_and_dispatch(&self, budget: Option<usize>) -> Result<DispatchStatus> {
        if !self.is_connected() {
            return Err(Error::new(ErrorKind::Disconnected));
        }

        let mut read = self.inner.read.lock().unwrap();
        self.dispatch_locked(&mut read, budget.unwrap_or(1))
    }

    /// Set the read timeout applied to subsequent dispatch reads.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let read = self.inner.read.lock().unwrap();
        read.transport.set_read_timeout(timeout)?;
        Ok(())
    }

    fn dispatch_locked(&self, read: &mut ReadHalf, budget: usize) -> Result<DispatchStatus> {
        let mut count = 0;

        while count < budget {
            self.inner.pending.sweep(Instant::now());

            match read.read_frame() {
                Ok(Some((frame, fds))) => {
                    self.dispatch_frame(read, frame, fds)?;
                    count += 1;
                }
                Ok(None) => {
                    self.inner.pending.sweep(Instant::now());

                    return Ok(if count > 0 {
                        DispatchStatus::Dispatched(count)
                    } else {
                        DispatchStatus::TimedOut
                    });
                }
                Err(error) => {
                    // A desynchronized or closed stream cannot recover.
                    self.close_with(read);
                    return Err(error);
                }
            }
        }

        Ok(DispatchStatus::Dispatched(count))
    }

    fn dispatch_frame(
        &self,
        read: &mut ReadHalf,
        frame: Vec<u8>,
        fds: Vec<OwnedFd>,
    ) -> Result<()> {
        let mut message = match Message::parse_from_bytes(&frame) {
            Ok((message, _)) => message,
            Err(error) => {
                tracing::error!("closing connection on unparseable frame: {error}");
                self.close_with(read);
                return Err(error);
            }
        };

        if let Err(error) = message.attach_fds(fds) {
            tracing::error!("closing connection on fd mismatch: {error}");
            self.close_with(read);
            return Err(error);
        }

        match message.message_type() {
            MessageType::MethodReturn | MessageType::Error => {
                let reply_serial = message.reply_serial().expect("reply without reply serial");

                if !self.inner.pending.complete(reply_serial, message) {
                    tracing::warn!(
                        reply_serial = reply_serial.get(),
                        "dropping reply with no matching pending call"
                    );
                }
            }
            MessageType::MethodCall => {
                self.inner.objects.dispatch_call(self, message)?;
            }
            MessageType::Signal => {
                self.inner.subscriptions.dispatch(&message);
            }
        }

        Ok(())
    }

    /// Close the connection, waking every pending waiter with
    /// `Disconnected`.
    pub fn close(&self) {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        self.inner.pending.disconnect_all();

        if let Ok(write) = self.inner.write.try_lock() {
            let _ = write.transport.shutdown();
        }

        if let Ok(read) = self.inner.read.try_lock() {
            let _ = read.transport.shutdown();
        }
    }

    fn close_with(&self, read: &mut ReadHalf) {
        let _ = read.transport.shutdown();

        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        self.inner.pending.disconnect_all();

        if let Ok(write) = self.inner.write.try_lock() {
            let _ = write.transport.shutdown();
        }
    }

    /// Register with the bus daemon and record the unique name it assigns.
    ///
    /// This must be the first method call on a bus connection.
    pub fn hello(&self) -> Result<()> {
        let message = Message::method_call(org_freedesktop_dbus::PATH, "Hello")
            .with_interface(org_freedesktop_dbus::INTERFACE)
            .with_destination(org_freedesktop_dbus::DESTINATION);

        let reply = check_reply(self.send_blocking(message, Some(METHOD_TIMEOUT))?)?;
        let name = reply.body().load::<&str>()?;

        *self.inner.unique_name.lock().unwrap() = Some(name.into());
        Ok(())
    }

    /// Request a well-known name from the bus daemon.
    pub fn request_name(&self, name: &str, flags: NameFlag) -> Result<RequestNameReply> {
        let mut message = Message::method_call(org_freedesktop_dbus::PATH, "RequestName")
            .with_interface(org_freedesktop_dbus::INTERFACE)
            .with_destination(org_freedesktop_dbus::DESTINATION);

        message.body_mut().store(name)?;
        message.body_mut().store(flags.bits())?;

        let reply = check_reply(self.send_blocking(message, Some(METHOD_TIMEOUT))?)?;
        let code = reply.body().load::<u32>()?;

        RequestNameReply::from_u32(code).ok_or_else(|| Error::new(ErrorKind::UnexpectedReply))
    }

    /// Export an object at the given path.
    ///
    /// Errors if an object is already exported there.
    pub fn export(&self, path: &ObjectPath, object: Object) -> Result<()> {
        self.inner.objects.export(path, object)
    }

    /// Remove the object exported at the given path.
    pub fn unexport(&self, path: &ObjectPath) -> bool {
        self.inner.objects.unexport(path)
    }

    /// Look up the object exported at the given path, if any.
    ///
    /// Lookup is exact; paths are not walked hierarchically.
    pub fn object(&self, path: &ObjectPath) -> Option<Arc<Object>> {
        self.inner.objects.lookup(path)
    }

    /// Subscribe a handler to signals matching `key`.
    ///
    /// On a bus connection, an `AddMatch` rule is installed with the
    /// daemon so matching signals are routed here. The subscription lives
    /// until the returned token is dropped.
    pub fn subscribe<F>(&self, key: SignalMatch, handler: F) -> Result<SignalToken>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.inner.subscriptions.insert(key.clone(), handler);

        if self.unique_name().is_some() {
            let mut message = Message::method_call(org_freedesktop_dbus::PATH, "AddMatch")
                .with_interface(org_freedesktop_dbus::INTERFACE)
                .with_destination(org_freedesktop_dbus::DESTINATION);

            message.set_no_reply(true);
            message.body_mut().store(key.rule().as_str())?;
            self.send_one_way(&message)?;
        }

        Ok(SignalToken {
            id,
            key,
            inner: Arc::downgrade(&self.inner),
        })
    }

    pub(crate) fn pending(&self) -> &PendingCalls {
        &self.inner.pending
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .field("unique_name", &self.unique_name())
            .finish()
    }
}

/// A non-owning handle to a [`Connection`].
///
/// Proxies hold one of these, so a forgotten proxy does not keep the
/// connection and its transport alive.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    inner: Weak<ConnectionInner>,
}

impl ConnectionHandle {
    /// Recover the connection, or fail with `Disconnected` if it has been
    /// torn down.
    pub fn upgrade(&self) -> Result<Connection> {
        match self.inner.upgrade() {
            Some(inner) => Ok(Connection { inner }),
            None => Err(Error::new(ErrorKind::Disconnected)),
        }
    }
}

/// A live signal subscription.
///
/// Dropping the token removes the subscription, and the bus match rule
/// along with it.
pub struct SignalToken {
    id: u64,
    key: SignalMatch,
    inner: Weak<ConnectionInner>,
}

impl Drop for SignalToken {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        inner.subscriptions.remove(self.id);
        let connection = Connection::from_inner(inner);

        if connection.unique_name().is_some() {
            let mut message = Message::method_call(org_freedesktop_dbus::PATH, "RemoveMatch")
                .with_interface(org_freedesktop_dbus::INTERFACE)
                .with_destination(org_freedesktop_dbus::DESTINATION);

            message.set_no_reply(true);

            if message.body_mut().store(self.key.rule().as_str()).is_ok() {
                let _ = connection.send_one_way(&message);
            }
        }
    }
}

/// Turn an error reply into an [`Error`], passing method returns through.
pub(crate) fn check_reply(message: Message) -> Result<Message> {
    if let MessageKind::Error { .. } = message.kind() {
        let name = message.error_name().unwrap_or("");
        let text = message.error_text();
        return Err(Error::remote(name, text));
    }

    Ok(message)
}
