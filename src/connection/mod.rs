//! The connection layer: transports, authentication and dispatch.

pub use self::transport::{Transport, UnixTransport};
mod transport;

pub use self::builder::ConnectionBuilder;
mod builder;

pub use self::connection::{Connection, ConnectionHandle, DispatchStatus, SignalToken};
pub(crate) use self::connection::check_reply;
mod connection;

pub use self::dispatcher::Dispatcher;
mod dispatcher;

pub(crate) use self::signals::Subscriptions;
pub use self::signals::SignalMatch;
mod signals;

mod sasl;

#[cfg(test)]
pub(crate) use self::transport::memory;

#[cfg(test)]
mod tests;
