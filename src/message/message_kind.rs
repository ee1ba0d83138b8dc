use crate::object_path::ObjectPathBuf;

use super::Serial;

/// The kind of a [`Message`].
///
/// [`Message`]: super::Message
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageKind {
    /// Method call. This message type may prompt a reply.
    MethodCall {
        /// The path of the object being called.
        path: ObjectPathBuf,
        /// The method being called.
        member: Box<str>,
    },
    /// Method reply with returned data.
    MethodReturn {
        /// The serial of the call this is a reply to.
        reply_serial: Serial,
    },
    /// Error reply. If the first body argument is a string, it is the error
    /// message.
    Error {
        /// The name of the error.
        error_name: Box<str>,
        /// The serial of the call this is a reply to.
        reply_serial: Serial,
    },
    /// Signal emission.
    Signal {
        /// The path of the object emitting the signal.
        path: ObjectPathBuf,
        /// The signal being emitted.
        member: Box<str>,
    },
}
