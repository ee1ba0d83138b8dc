use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use crate::connection::Connection;
use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::object_path::{ObjectPath, ObjectPathBuf};
use crate::org_freedesktop_dbus::{error_name, INTROSPECTABLE, PEER, PROPERTIES};
use crate::signature::Signature;
use crate::value::{Array, DictEntry, Value};

use super::introspect::introspect;
use super::{Method, Object};

/// The tree of locally exported objects, indexed by path.
///
/// Lookup is exact; there is no wildcard walk.
pub(crate) struct ObjectRegistry {
    objects: RwLock<HashMap<ObjectPathBuf, Arc<Object>>>,
}

impl ObjectRegistry {
    pub(crate) fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn export(&self, path: &ObjectPath, object: Object) -> Result<()> {
        let mut objects = self.objects.write().unwrap();

        if objects.contains_key(path) {
            return Err(Error::new(ErrorKind::ObjectPathInUse));
        }

        objects.insert(path.to_owned(), Arc::new(object));
        Ok(())
    }

    pub(crate) fn unexport(&self, path: &ObjectPath) -> bool {
        self.objects.write().unwrap().remove(path).is_some()
    }

    pub(crate) fn lookup(&self, path: &ObjectPath) -> Option<Arc<Object>> {
        self.objects.read().unwrap().get(path).cloned()
    }

    /// The first path segments below `path` with exported objects, for
    /// introspection child nodes.
    fn children(&self, path: &ObjectPath) -> Vec<String> {
        let prefix = if path.is_root() {
            String::from("/")
        } else {
            format!("{}/", path.as_str())
        };

        let objects = self.objects.read().unwrap();
        let mut children = Vec::new();

        for exported in objects.keys() {
            let Some(rest) = exported.as_str().strip_prefix(&prefix) else {
                continue;
            };

            let head = rest.split('/').next().unwrap_or(rest);

            if !head.is_empty() && !children.iter().any(|c| c == head) {
                children.push(head.to_owned());
            }
        }

        children.sort();
        children
    }

    /// Route an inbound method call and emit its reply.
    ///
    /// Handler errors become error replies when the caller expects one and
    /// are logged otherwise. The returned error is reserved for transport
    /// failures while sending the reply.
    pub(crate) fn dispatch_call(&self, connection: &Connection, call: Message) -> Result<()> {
        match self.handle_call(&call) {
            Ok(reply) => {
                // An invalidated reply (the call was fire-and-forget) is
                // skipped by the send path.
                connection.send_one_way(&reply)?;
            }
            Err(error) => {
                if call.expects_reply() {
                    let (name, text) = match error.as_remote() {
                        Some((name, text)) => (name.to_owned(), text.map(str::to_owned)),
                        None => (error.error_name().to_owned(), Some(error.to_string())),
                    };

                    let reply = call.error_reply(&name, text.as_deref())?;
                    connection.send_one_way(&reply)?;
                } else {
                    tracing::warn!(
                        member = call.member().unwrap_or(""),
                        "handler failed for a call expecting no reply: {error}"
                    );
                }
            }
        }

        Ok(())
    }

    fn handle_call(&self, call: &Message) -> Result<Message> {
        let path = call
            .path()
            .ok_or_else(|| Error::remote(error_name::INVALID_ARGS, Some("call without a path")))?;

        let Some(object) = self.lookup(path) else {
            return Err(Error::remote(
                error_name::UNKNOWN_OBJECT,
                Some(&format!("no object exported at {path}")),
            ));
        };

        let member = call.member().unwrap_or("");

        let method = match call.interface() {
            Some(interface) => match object.interface(interface) {
                Some(iface) => match iface.method(member) {
                    Some(method) => Some(method),
                    None => {
                        if is_builtin(interface) {
                            return self.builtin(&object, path, interface, member, call);
                        }

                        return Err(unknown_method(interface, member));
                    }
                },
                None => {
                    if is_builtin(interface) {
                        return self.builtin(&object, path, interface, member, call);
                    }

                    return Err(Error::remote(
                        error_name::UNKNOWN_INTERFACE,
                        Some(&format!("no interface {interface}")),
                    ));
                }
            },
            None => {
                // Without an interface the member must be unique across the
                // whole object.
                let mut found = None;

                for iface in object.interfaces.values() {
                    if let Some(method) = iface.method(member) {
                        if found.is_some() {
                            return Err(unknown_method("", member));
                        }

                        found = Some(method);
                    }
                }

                found
            }
        };

        let Some(method) = method else {
            return Err(unknown_method(call.interface().unwrap_or(""), member));
        };

        invoke(method, call)
    }

    fn builtin(
        &self,
        object: &Object,
        path: &ObjectPath,
        interface: &str,
        member: &str,
        call: &Message,
    ) -> Result<Message> {
        match (interface, member) {
            (INTROSPECTABLE, "Introspect") => {
                let xml = introspect(object, path, &self.children(path));
                let mut reply = call.method_return()?;
                reply.body_mut().store(xml.as_str())?;
                Ok(reply)
            }
            (PROPERTIES, "Get") => self.property_get(object, call),
            (PROPERTIES, "Set") => self.property_set(object, call),
            (PROPERTIES, "GetAll") => self.property_get_all(object, call),
            (PEER, "Ping") => call.method_return(),
            (PEER, "GetMachineId") => Err(Error::remote(
                error_name::NOT_SUPPORTED,
                Some("machine id is not available"),
            )),
            _ => Err(unknown_method(interface, member)),
        }
    }

    fn property_get(&self, object: &Object, call: &Message) -> Result<Message> {
        if call.signature().as_str() != "ss" {
            return Err(invalid_args(call.signature(), "ss"));
        }

        let mut body = call.body();
        let interface = body.load::<&str>()?;
        let name = body.load::<&str>()?;

        let property = lookup_property(object, interface, name)?;

        if !property.access.readable() {
            return Err(Error::remote(
                error_name::ACCESS_DENIED,
                Some(&format!("property {name} is write-only")),
            ));
        }

        let mut reply = call.method_return()?;
        reply.body_mut().store_value(&property.get().into_variant())?;
        Ok(reply)
    }

    fn property_set(&self, object: &Object, call: &Message) -> Result<Message> {
        if call.signature().as_str() != "ssv" {
            return Err(invalid_args(call.signature(), "ssv"));
        }

        let mut body = call.body();
        let interface = body.load::<&str>()?;
        let name = body.load::<&str>()?;
        let value = body.load_value()?;

        let property = lookup_property(object, interface, name)?;

        if !property.access.writable() {
            return Err(Error::remote(
                error_name::PROPERTY_READ_ONLY,
                Some(&format!("property {name} cannot be written")),
            ));
        }

        let value = match value {
            Value::Variant(inner) => *inner,
            value => value,
        };

        if property.set(value).is_err() {
            return Err(Error::remote(
                error_name::INVALID_ARGS,
                Some(&format!("value does not match the type of {name}")),
            ));
        }

        call.method_return()
    }

    fn property_get_all(&self, object: &Object, call: &Message) -> Result<Message> {
        if call.signature().as_str() != "s" {
            return Err(invalid_args(call.signature(), "s"));
        }

        let interface = call.body().load::<&str>()?;

        let Some(iface) = object.interface(interface) else {
            return Err(Error::remote(
                error_name::UNKNOWN_INTERFACE,
                Some(&format!("no interface {interface}")),
            ));
        };

        let mut entries = Array::dict(Signature::STRING, Signature::VARIANT)?;

        for (name, property) in &iface.properties {
            if !property.access.readable() {
                continue;
            }

            entries.push(Value::from(DictEntry::new(
                Value::from(&**name),
                property.get().into_variant(),
            )?))?;
        }

        let mut reply = call.method_return()?;
        reply.body_mut().store_value(&Value::Array(entries))?;
        Ok(reply)
    }
}

fn invoke(method: &Method, call: &Message) -> Result<Message> {
    if *call.signature() != method.in_signature {
        return Err(invalid_args(call.signature(), method.in_signature.as_str()));
    }

    match catch_unwind(AssertUnwindSafe(|| (method.handler)(call))) {
        Ok(result) => result,
        Err(_) => Err(Error::remote(
            error_name::FAILED,
            Some("method handler panicked"),
        )),
    }
}

fn lookup_property<'o>(
    object: &'o Object,
    interface: &str,
    name: &str,
) -> Result<&'o super::Property> {
    let Some(iface) = object.interface(interface) else {
        return Err(Error::remote(
            error_name::UNKNOWN_INTERFACE,
            Some(&format!("no interface {interface}")),
        ));
    };

    iface.property(name).ok_or_else(|| {
        Error::remote(
            error_name::UNKNOWN_PROPERTY,
            Some(&format!("no property {name} on {interface}")),
        )
    })
}

fn is_builtin(interface: &str) -> bool {
    matches!(interface, INTROSPECTABLE | PROPERTIES | PEER)
}

fn unknown_method(interface: &str, member: &str) -> Error {
    Error::remote(
        error_name::UNKNOWN_METHOD,
        Some(&format!("no method {interface}.{member}")),
    )
}

fn invalid_args(found: &Signature, expected: &str) -> Error {
    Error::remote(
        error_name::INVALID_ARGS,
        Some(&format!("expected signature {expected:?}, got {found:?}")),
    )
}
