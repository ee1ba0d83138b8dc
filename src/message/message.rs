use std::os::fd::OwnedFd;

use crate::body::Body;
use crate::body_buf::BodyBuf;
use crate::error::{Error, ErrorKind, Result};
use crate::object_path::ObjectPath;
use crate::proto::{Endianness, Flags, MessageType};
use crate::signature::Signature;

use super::{MessageKind, Serial};

/// A D-Bus message: one of a method call, a method return, an error reply
/// or a signal.
///
/// A message owns its header fields, its marshalled body and the file
/// descriptors passed alongside it. Descriptors are closed when the message
/// is dropped unless they are detached with [`take_fd`].
///
/// [`take_fd`]: Self::take_fd
///
/// # Examples
///
/// ```
/// use dbus_sync::{Message, MessageKind, ObjectPath};
///
/// const PATH: &ObjectPath = ObjectPath::new_const(b"/org/example/Obj");
///
/// let m = Message::method_call(PATH, "Frobnicate")
///     .with_destination(":1.5");
///
/// assert!(matches!(m.kind(), MessageKind::MethodCall { .. }));
/// assert!(m.expects_reply());
/// assert_eq!(m.serial(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub(super) kind: MessageKind,
    /// Serial of the message; `None` until one is assigned at send time.
    pub(super) serial: Option<Serial>,
    pub(super) flags: Flags,
    pub(super) endianness: Endianness,
    pub(super) interface: Option<Box<str>>,
    pub(super) destination: Option<Box<str>>,
    pub(super) sender: Option<Box<str>>,
    pub(super) body: BodyBuf,
    /// Number of fds the wire header declared. Only meaningful for parsed
    /// messages, until the out-of-band descriptors are attached.
    pub(super) declared_fds: u32,
    pub(super) valid: bool,
}

impl Message {
    fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            serial: None,
            flags: Flags::empty(),
            endianness: Endianness::NATIVE,
            interface: None,
            destination: None,
            sender: None,
            body: BodyBuf::new(),
            declared_fds: 0,
            valid: true,
        }
    }

    /// Construct a method call.
    #[must_use]
    pub fn method_call(path: &ObjectPath, member: &str) -> Self {
        Self::new(MessageKind::MethodCall {
            path: path.to_owned(),
            member: member.into(),
        })
    }

    /// Construct a signal.
    #[must_use]
    pub fn signal(path: &ObjectPath, interface: &str, member: &str) -> Self {
        let mut message = Self::new(MessageKind::Signal {
            path: path.to_owned(),
            member: member.into(),
        });

        message.interface = Some(interface.into());
        message
    }

    /// Construct a method return replying to this call.
    ///
    /// The reply carries this call's serial as its reply serial and this
    /// call's sender as its destination. If the call was sent with
    /// [`Flags::NO_REPLY_EXPECTED`], the returned message is invalidated
    /// and sending it is a silent no-op.
    ///
    /// Errors if this message is not a method call, or has no serial.
    pub fn method_return(&self) -> Result<Self> {
        let MessageKind::MethodCall { .. } = self.kind else {
            return Err(Error::new(ErrorKind::NotAMethodCall));
        };

        let reply_serial = self.serial.ok_or(ErrorKind::UnassignedSerial)?;

        let mut message = Self::new(MessageKind::MethodReturn { reply_serial });
        message.endianness = self.endianness;
        message.destination = self.sender.clone();
        message.sender = self.destination.clone();
        message.valid = !self.flags.contains(Flags::NO_REPLY_EXPECTED);
        Ok(message)
    }

    /// Construct an error reply to this call.
    ///
    /// When `text` is given it is stored as the first body argument, where
    /// clients conventionally look for a human-readable message. The same
    /// reply-suppression rule applies as for [`method_return`].
    ///
    /// [`method_return`]: Self::method_return
    pub fn error_reply(&self, error_name: &str, text: Option<&str>) -> Result<Self> {
        let MessageKind::MethodCall { .. } = self.kind else {
            return Err(Error::new(ErrorKind::NotAMethodCall));
        };

        let reply_serial = self.serial.ok_or(ErrorKind::UnassignedSerial)?;

        let mut message = Self::new(MessageKind::Error {
            error_name: error_name.into(),
            reply_serial,
        });

        message.endianness = self.endianness;
        message.destination = self.sender.clone();
        message.sender = self.destination.clone();
        message.valid = !self.flags.contains(Flags::NO_REPLY_EXPECTED);

        if let Some(text) = text {
            message.body.store(text)?;
        }

        Ok(message)
    }

    /// The kind of the message.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// The wire type of the message.
    pub fn message_type(&self) -> MessageType {
        match self.kind {
            MessageKind::MethodCall { .. } => MessageType::MethodCall,
            MessageKind::MethodReturn { .. } => MessageType::MethodReturn,
            MessageKind::Error { .. } => MessageType::Error,
            MessageKind::Signal { .. } => MessageType::Signal,
        }
    }

    /// The serial of the message, if one has been assigned.
    pub fn serial(&self) -> Option<Serial> {
        self.serial
    }

    /// Modify the serial of the message.
    #[must_use]
    pub fn with_serial(mut self, serial: Serial) -> Self {
        self.serial = Some(serial);
        self
    }

    /// The flags of the message.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Modify the flags of the message.
    #[must_use]
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// The endianness the message marshals with.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Modify the endianness of the message.
    ///
    /// This replaces the body with one of the given endianness; it is only
    /// meaningful before body arguments are appended.
    #[must_use]
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self.body = BodyBuf::with_endianness(endianness);
        self
    }

    /// Test if the sender expects a reply to this message.
    ///
    /// True only for a method call without [`Flags::NO_REPLY_EXPECTED`].
    pub fn expects_reply(&self) -> bool {
        matches!(self.kind, MessageKind::MethodCall { .. })
            && !self.flags.contains(Flags::NO_REPLY_EXPECTED)
    }

    /// Set whether the message expects a reply.
    pub fn set_no_reply(&mut self, no_reply: bool) {
        self.flags.set(Flags::NO_REPLY_EXPECTED, no_reply);
    }

    /// Test if the bus may start an owner for the destination.
    pub fn auto_start(&self) -> bool {
        !self.flags.contains(Flags::NO_AUTO_START)
    }

    /// Set whether the bus may start an owner for the destination.
    pub fn set_auto_start(&mut self, auto_start: bool) {
        self.flags.set(Flags::NO_AUTO_START, !auto_start);
    }

    /// The path header field, present on method calls and signals.
    pub fn path(&self) -> Option<&ObjectPath> {
        match &self.kind {
            MessageKind::MethodCall { path, .. } => Some(path),
            MessageKind::Signal { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The member header field, present on method calls and signals.
    pub fn member(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::MethodCall { member, .. } => Some(member),
            MessageKind::Signal { member, .. } => Some(member),
            _ => None,
        }
    }

    /// The reply serial, present on method returns and errors.
    pub fn reply_serial(&self) -> Option<Serial> {
        match self.kind {
            MessageKind::MethodReturn { reply_serial } => Some(reply_serial),
            MessageKind::Error { reply_serial, .. } => Some(reply_serial),
            _ => None,
        }
    }

    /// The error name, present on error replies.
    pub fn error_name(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Error { error_name, .. } => Some(error_name),
            _ => None,
        }
    }

    /// The human-readable text of an error reply, when its first body
    /// argument is a string.
    pub fn error_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Error { .. } => match self.signature().first_type() {
                Some(ty) if ty == crate::proto::Type::STRING => self.body().load::<&str>().ok(),
                _ => None,
            },
            _ => None,
        }
    }

    /// The interface header field.
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Modify the interface of the message.
    #[must_use]
    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// The destination header field.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Modify the destination of the message.
    #[must_use]
    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// The sender header field.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Modify the sender of the message.
    #[must_use]
    pub fn with_sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// The signature of the message body.
    pub fn signature(&self) -> &Signature {
        self.body.signature()
    }

    /// Get a read iterator positioned at the start of the body.
    pub fn body(&self) -> Body<'_> {
        self.body.as_body()
    }

    /// The body buffer of the message.
    pub fn body_buf(&self) -> &BodyBuf {
        &self.body
    }

    /// Mutable access to the body buffer, to append arguments.
    pub fn body_mut(&mut self) -> &mut BodyBuf {
        &mut self.body
    }

    /// Replace the body of the message.
    ///
    /// The message adopts the endianness the body was marshalled with.
    #[must_use]
    pub fn with_body(mut self, body: BodyBuf) -> Self {
        self.endianness = body.endianness();
        self.body = body;
        self
    }

    /// The number of file descriptors attached to the message.
    pub fn fd_count(&self) -> usize {
        self.body.fd_count()
    }

    /// Detach the file descriptor a [`Value::UnixFd`] index refers to.
    ///
    /// Detached descriptors are no longer closed when the message drops.
    ///
    /// [`Value::UnixFd`]: crate::Value::UnixFd
    pub fn take_fd(&mut self, index: u32) -> Result<OwnedFd> {
        self.body.take_fd(index)
    }

    /// Attach the out-of-band descriptors received alongside this message.
    pub(crate) fn attach_fds(&mut self, fds: Vec<OwnedFd>) -> Result<()> {
        if fds.len() as u32 != self.declared_fds {
            return Err(Error::new(ErrorKind::FdCountMismatch {
                declared: self.declared_fds,
                received: fds.len() as u32,
            }));
        }

        self.body.attach_fds(fds);
        Ok(())
    }

    /// Mark the message as not-for-send.
    ///
    /// Send operations silently skip invalidated messages.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Test if the message may be sent.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}
