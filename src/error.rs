use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::org_freedesktop_dbus::error_name;
use crate::proto::{HeaderField, Type};
use crate::signature::SignatureBuf;
use crate::{ObjectPathError, SignatureError};

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    /// Construct an error describing a peer-delivered error reply.
    pub fn remote(name: &str, message: Option<&str>) -> Self {
        Self::new(ErrorKind::Remote {
            name: name.into(),
            message: message.map(Box::from),
        })
    }

    /// Test if the error indicates that a wait ran out of time.
    pub fn is_timed_out(&self) -> bool {
        matches!(self.kind, ErrorKind::TimedOut)
    }

    /// Test if the error indicates that a pending call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Test if the error indicates that the connection was torn down.
    pub fn is_disconnected(&self) -> bool {
        matches!(self.kind, ErrorKind::Disconnected)
    }

    /// The error name and optional text of a peer-delivered error reply.
    pub fn as_remote(&self) -> Option<(&str, Option<&str>)> {
        match &self.kind {
            ErrorKind::Remote { name, message } => Some((name, message.as_deref())),
            _ => None,
        }
    }

    /// The D-Bus error name this error maps to when converted into an error
    /// reply by the dispatcher.
    pub(crate) fn error_name(&self) -> &str {
        match &self.kind {
            ErrorKind::Remote { name, .. } => name,
            ErrorKind::BodySignatureMismatch { .. } => error_name::INVALID_ARGS,
            ErrorKind::TypeMismatch { .. } => error_name::INVALID_ARGS,
            ErrorKind::TimedOut => error_name::TIMED_OUT,
            ErrorKind::Disconnected => error_name::DISCONNECTED,
            _ => error_name::FAILED,
        }
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<ObjectPathError> for Error {
    #[inline]
    fn from(error: ObjectPathError) -> Self {
        Self::new(ErrorKind::ObjectPath(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::new(ErrorKind::Io(error))
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Debug for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.kind, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(..) => write!(f, "I/O error"),
            ErrorKind::Signature(..) => write!(f, "Signature error"),
            ErrorKind::ObjectPath(..) => write!(f, "Object path error"),
            ErrorKind::Utf8(..) => write!(f, "UTF-8 error"),
            ErrorKind::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch, expected {expected} but found {found}")
            }
            ErrorKind::BodySignatureMismatch { expected, found } => {
                write!(
                    f,
                    "Body signature mismatch, expected {expected:?} but found {found:?}"
                )
            }
            ErrorKind::BufferUnderflow => write!(f, "Buffer underflow"),
            ErrorKind::NonZeroPadding => write!(f, "Padding byte is not zero"),
            ErrorKind::InvalidBoolean(value) => {
                write!(f, "Boolean value {value} is neither 0 nor 1")
            }
            ErrorKind::InvalidEndianness(byte) => {
                write!(f, "Invalid endianness marker {byte:#04x}")
            }
            ErrorKind::InvalidMessageType(byte) => {
                write!(f, "Invalid message type {byte}")
            }
            ErrorKind::InvalidProtocolVersion(version) => {
                write!(f, "Unsupported protocol major version {version}")
            }
            ErrorKind::NotNullTerminated => write!(f, "String is not null terminated"),
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::MessageTooLong(length) => {
                write!(
                    f,
                    "Message of length {length} is too long (max is 134217728)"
                )
            }
            ErrorKind::DepthExceeded => {
                write!(f, "Containers nested deeper than 64 levels")
            }
            ErrorKind::MissingHeaderField(field) => {
                write!(f, "Missing required {field:?} header field")
            }
            ErrorKind::ZeroSerial => write!(f, "Zero serial in message header"),
            ErrorKind::UnassignedSerial => {
                write!(f, "Message has not been assigned a serial")
            }
            ErrorKind::UnknownFd(index) => {
                write!(f, "No file descriptor at index {index}")
            }
            ErrorKind::FdCountMismatch { declared, received } => {
                write!(
                    f,
                    "Message declared {declared} file descriptors but carried {received}"
                )
            }
            ErrorKind::TrailingBytes => {
                write!(f, "Trailing bytes after the last value in a body")
            }
            ErrorKind::UnsupportedVariant(signature) => {
                write!(f, "Unsupported variant signature {signature:?}")
            }
            ErrorKind::UnexpectedReply => {
                write!(f, "Reply body did not match the expected shape")
            }
            ErrorKind::Disconnected => write!(f, "Connection is closed"),
            ErrorKind::TimedOut => write!(f, "Timed out"),
            ErrorKind::Cancelled => write!(f, "Pending call was cancelled"),
            ErrorKind::Remote { name, message } => match message {
                Some(message) => write!(f, "{name}: {message}"),
                None => write!(f, "{name}"),
            },
            ErrorKind::NotAMethodCall => {
                write!(f, "Only method calls can expect a reply")
            }
            ErrorKind::ObjectPathInUse => {
                write!(f, "An object is already exported at this path")
            }
            ErrorKind::MissingBus => write!(f, "Missing bus to connect to"),
            ErrorKind::InvalidAddress => write!(f, "Invalid D-Bus address"),
            ErrorKind::InvalidSasl => write!(f, "Invalid SASL message"),
            ErrorKind::InvalidSaslResponse => write!(f, "Unexpected SASL response"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::ObjectPath(error) => Some(error),
            ErrorKind::Utf8(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    ObjectPath(ObjectPathError),
    Utf8(Utf8Error),
    TypeMismatch {
        expected: Type,
        found: Type,
    },
    BodySignatureMismatch {
        expected: SignatureBuf,
        found: SignatureBuf,
    },
    BufferUnderflow,
    NonZeroPadding,
    InvalidBoolean(u32),
    InvalidEndianness(u8),
    InvalidMessageType(u8),
    InvalidProtocolVersion(u8),
    NotNullTerminated,
    ArrayTooLong(u32),
    MessageTooLong(u32),
    DepthExceeded,
    MissingHeaderField(HeaderField),
    ZeroSerial,
    UnassignedSerial,
    UnknownFd(u32),
    FdCountMismatch {
        declared: u32,
        received: u32,
    },
    TrailingBytes,
    UnsupportedVariant(SignatureBuf),
    UnexpectedReply,
    Disconnected,
    TimedOut,
    Cancelled,
    Remote {
        name: Box<str>,
        message: Option<Box<str>>,
    },
    NotAMethodCall,
    ObjectPathInUse,
    MissingBus,
    InvalidAddress,
    InvalidSasl,
    InvalidSaslResponse,
}
