//! A thread-based D-Bus implementation in pure Rust.
//!
//! This crate implements the D-Bus message layer behind a typed,
//! object-oriented surface: remote objects are addressed by bus name,
//! object path, interface and member; arguments travel as typed values;
//! local objects expose methods, signals and properties that remote peers
//! can invoke.
//!
//! A [`Connection`] is usable from many threads. Run a [`Dispatcher`] to
//! route inbound traffic on a background thread, or drive
//! [`Connection::read_and_dispatch`] from a loop of your own.
//!
//! ```no_run
//! use dbus_sync::{BodyBuf, Connection, Dispatcher, ObjectPath, Proxy};
//!
//! let connection = Connection::session_bus()?;
//! let dispatcher = Dispatcher::start(connection.clone());
//!
//! let proxy = Proxy::new(
//!     &connection,
//!     "org.freedesktop.DBus",
//!     ObjectPath::new_const(b"/org/freedesktop/DBus"),
//!     "org.freedesktop.DBus",
//! );
//!
//! let reply = proxy.call("ListNames", BodyBuf::new())?;
//! let _names = reply.body().load_value()?;
//!
//! drop(dispatcher);
//! # Ok::<_, dbus_sync::Error>(())
//! ```

#![deny(missing_docs)]
#![allow(clippy::module_inception)]

#[doc(inline)]
pub use self::proto::{Endianness, Flags, MessageType, Type};
pub mod proto;

pub mod org_freedesktop_dbus;

#[doc(inline)]
pub use self::error::{Error, Result};
mod error;

#[doc(inline)]
pub use self::signature::{Signature, SignatureBuf, SignatureError};
mod signature;

#[doc(inline)]
pub use self::object_path::{ObjectPath, ObjectPathBuf, ObjectPathError};
mod object_path;

#[doc(inline)]
pub use self::value::{Array, DictEntry, Value};
mod value;

#[doc(inline)]
pub use self::body::{Body, Load};
mod body;

#[doc(inline)]
pub use self::body_buf::{BodyBuf, Store};
mod body_buf;

#[doc(inline)]
pub use self::message::{Message, MessageKind, Serial};
mod message;

#[doc(inline)]
pub use self::pending::PendingCall;
mod pending;

#[doc(inline)]
pub use self::connection::{
    Connection, ConnectionBuilder, ConnectionHandle, DispatchStatus, Dispatcher, SignalMatch,
    SignalToken, Transport, UnixTransport,
};
mod connection;

#[doc(inline)]
pub use self::object::{Access, Interface, Method, MethodHandler, Object, Property, SignalSpec};
mod object;

#[doc(inline)]
pub use self::proxy::Proxy;
mod proxy;
