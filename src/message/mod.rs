//! The D-Bus message data model.

#[cfg(test)]
mod tests;

pub use self::message::Message;
mod message;

pub use self::message_kind::MessageKind;
mod message_kind;

pub use self::serial::Serial;
mod serial;

mod parse;
mod serialize;
