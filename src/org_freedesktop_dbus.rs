//! Names and constants of the `org.freedesktop.DBus` interfaces.

use crate::object_path::ObjectPath;

/// Well known destination name of the bus daemon.
pub const DESTINATION: &str = "org.freedesktop.DBus";

/// Well known interface name of the bus daemon.
pub const INTERFACE: &str = "org.freedesktop.DBus";

/// Well known object path of the bus daemon.
pub const PATH: &ObjectPath = ObjectPath::new_const(b"/org/freedesktop/DBus");

/// The standard introspection interface, implemented by the object
/// registry for every exported object.
pub const INTROSPECTABLE: &str = "org.freedesktop.DBus.Introspectable";

/// The standard properties interface, implemented by the object registry
/// for every exported object.
pub const PROPERTIES: &str = "org.freedesktop.DBus.Properties";

/// The standard peer interface.
pub const PEER: &str = "org.freedesktop.DBus.Peer";

/// The standard `org.freedesktop.DBus.Error.*` error names.
pub mod error_name {
    /// A generic failure.
    pub const FAILED: &str = "org.freedesktop.DBus.Error.Failed";
    /// No object is exported at the requested path.
    pub const UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
    /// The object has no such interface.
    pub const UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
    /// The interface has no such method.
    pub const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    /// The interface has no such property.
    pub const UNKNOWN_PROPERTY: &str = "org.freedesktop.DBus.Error.UnknownProperty";
    /// The property cannot be written.
    pub const PROPERTY_READ_ONLY: &str = "org.freedesktop.DBus.Error.PropertyReadOnly";
    /// The call arguments do not match the method signature.
    pub const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
    /// The operation is not supported.
    pub const NOT_SUPPORTED: &str = "org.freedesktop.DBus.Error.NotSupported";
    /// No reply arrived for a call that expected one.
    pub const NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";
    /// The connection was torn down.
    pub const DISCONNECTED: &str = "org.freedesktop.DBus.Error.Disconnected";
    /// The call ran out of time.
    pub const TIMED_OUT: &str = "org.freedesktop.DBus.Error.TimedOut";
    /// The caller is not allowed to perform the operation.
    pub const ACCESS_DENIED: &str = "org.freedesktop.DBus.Error.AccessDenied";
}

bitflags::bitflags! {
    /// The flags to a `RequestName` call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NameFlag: u32 {
        /// Allow another application requesting the name with
        /// `REPLACE_EXISTING` to take it over.
        const ALLOW_REPLACEMENT = 1;
        /// Replace the current owner, if it allows replacement.
        const REPLACE_EXISTING = 2;
        /// Fail instead of queueing when the name is already owned.
        const DO_NOT_QUEUE = 4;
    }
}

/// The reply to a `RequestName` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RequestNameReply {
    /// The caller is now the primary owner of the name.
    PrimaryOwner = 1,
    /// The name already has an owner; the caller was queued for it.
    InQueue = 2,
    /// The name already has an owner and the caller declined to queue.
    Exists = 3,
    /// The caller already owns the name.
    AlreadyOwner = 4,
}

impl RequestNameReply {
    pub(crate) fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::PrimaryOwner),
            2 => Some(Self::InQueue),
            3 => Some(Self::Exists),
            4 => Some(Self::AlreadyOwner),
            _ => None,
        }
    }
}
