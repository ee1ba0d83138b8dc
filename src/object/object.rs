use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::signature::{Signature, SignatureBuf};
use crate::value::Value;

/// The callable behind an exported method.
///
/// Receives the inbound call and produces the reply, either a method
/// return or an error; a returned `Err` is converted into an error reply
/// by the dispatcher.
pub type MethodHandler = Box<dyn Fn(&Message) -> Result<Message> + Send + Sync>;

/// An exported method: its argument signatures and its handler.
pub struct Method {
    pub(crate) in_signature: SignatureBuf,
    pub(crate) out_signature: SignatureBuf,
    pub(crate) handler: MethodHandler,
}

impl Method {
    /// Construct a method with the given input and output signatures.
    pub fn new<F>(in_signature: &Signature, out_signature: &Signature, handler: F) -> Self
    where
        F: Fn(&Message) -> Result<Message> + Send + Sync + 'static,
    {
        Self {
            in_signature: in_signature.to_owned(),
            out_signature: out_signature.to_owned(),
            handler: Box::new(handler),
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("in", &self.in_signature)
            .field("out", &self.out_signature)
            .finish()
    }
}

/// The declaration of a signal an interface may emit, for introspection.
#[derive(Debug)]
pub struct SignalSpec {
    pub(crate) signature: SignatureBuf,
}

/// Access mode of an exported property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The property can only be read.
    Read,
    /// The property can only be written.
    Write,
    /// The property can be read and written.
    ReadWrite,
}

impl Access {
    pub(crate) fn readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub(crate) fn writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// An exported property holding a [`Value`].
///
/// Reads and writes go through the registry's implementation of
/// `org.freedesktop.DBus.Properties`.
#[derive(Debug)]
pub struct Property {
    pub(crate) signature: SignatureBuf,
    pub(crate) access: Access,
    value: Mutex<Value>,
}

impl Property {
    /// Construct a property with the given signature, access mode and
    /// initial value.
    ///
    /// Errors if the initial value does not match the signature.
    pub fn new(signature: &Signature, access: Access, initial: Value) -> Result<Self> {
        if initial.signature()? != *signature {
            return Err(Error::new(ErrorKind::BodySignatureMismatch {
                expected: signature.to_owned(),
                found: initial.signature()?,
            }));
        }

        Ok(Self {
            signature: signature.to_owned(),
            access,
            value: Mutex::new(initial),
        })
    }

    /// The current value of the property.
    pub fn get(&self) -> Value {
        self.value.lock().unwrap().clone()
    }

    /// Replace the value of the property.
    ///
    /// Errors if the value does not match the property signature. Access
    /// checks are the caller's business; remote writes are checked by the
    /// dispatcher.
    pub fn set(&self, value: Value) -> Result<()> {
        let found = value.signature()?;

        if found != self.signature {
            return Err(Error::new(ErrorKind::BodySignatureMismatch {
                expected: self.signature.clone(),
                found,
            }));
        }

        *self.value.lock().unwrap() = value;
        Ok(())
    }
}

/// A named collection of methods, signals and properties.
#[derive(Debug, Default)]
pub struct Interface {
    pub(crate) methods: BTreeMap<Box<str>, Method>,
    pub(crate) signals: BTreeMap<Box<str>, SignalSpec>,
    pub(crate) properties: BTreeMap<Box<str>, Property>,
}

impl Interface {
    /// Construct a new empty interface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method to the interface.
    #[must_use]
    pub fn with_method<F>(
        mut self,
        name: &str,
        in_signature: &Signature,
        out_signature: &Signature,
        handler: F,
    ) -> Self
    where
        F: Fn(&Message) -> Result<Message> + Send + Sync + 'static,
    {
        self.methods
            .insert(name.into(), Method::new(in_signature, out_signature, handler));
        self
    }

    /// Declare a signal the interface may emit.
    #[must_use]
    pub fn with_signal(mut self, name: &str, signature: &Signature) -> Self {
        self.signals.insert(
            name.into(),
            SignalSpec {
                signature: signature.to_owned(),
            },
        );
        self
    }

    /// Add a property to the interface.
    #[must_use]
    pub fn with_property(mut self, name: &str, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }
}

/// A locally exported object: a set of named interfaces.
///
/// # Examples
///
/// ```
/// use dbus_sync::{Interface, Object, Signature};
///
/// let object = Object::new().with_interface(
///     "org.example.Echo",
///     Interface::new().with_method(
///         "Echo",
///         Signature::STRING,
///         Signature::STRING,
///         |call| {
///             let text = call.body().load::<&str>()?;
///             let mut reply = call.method_return()?;
///             reply.body_mut().store(text)?;
///             Ok(reply)
///         },
///     ),
/// );
///
/// assert!(object.interface("org.example.Echo").is_some());
/// ```
#[derive(Debug, Default)]
pub struct Object {
    pub(crate) interfaces: BTreeMap<Box<str>, Interface>,
}

impl Object {
    /// Construct a new object with no interfaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface to the object.
    #[must_use]
    pub fn with_interface(mut self, name: &str, interface: Interface) -> Self {
        self.interfaces.insert(name.into(), interface);
        self
    }

    /// Look up an interface by name.
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }
}
