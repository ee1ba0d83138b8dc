//! Introspection XML generation for exported objects.

use std::fmt::Write;

use crate::object_path::ObjectPath;
use crate::org_freedesktop_dbus::{INTROSPECTABLE, PEER, PROPERTIES};
use crate::signature::Signature;

use super::{Access, Object};

const DOCTYPE: &str = "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n";

fn write_args(out: &mut String, signature: &Signature, direction: Option<&str>) {
    for ty in signature.iter() {
        match direction {
            Some(direction) => {
                let _ = writeln!(
                    out,
                    "      <arg type=\"{}\" direction=\"{direction}\"/>",
                    ty.as_str()
                );
            }
            None => {
                let _ = writeln!(out, "      <arg type=\"{}\"/>", ty.as_str());
            }
        }
    }
}

/// Render the `Introspect` reply for an object: its interfaces, the
/// standard interfaces the registry implements for it, and its child
/// nodes.
pub(super) fn introspect(object: &Object, path: &ObjectPath, children: &[String]) -> String {
    let mut out = String::from(DOCTYPE);

    let _ = writeln!(out, "<node name=\"{}\">", path.as_str());

    for (name, interface) in &object.interfaces {
        let _ = writeln!(out, "  <interface name=\"{name}\">");

        for (name, method) in &interface.methods {
            let _ = writeln!(out, "    <method name=\"{name}\">");
            write_args(&mut out, &method.in_signature, Some("in"));
            write_args(&mut out, &method.out_signature, Some("out"));
            let _ = writeln!(out, "    </method>");
        }

        for (name, signal) in &interface.signals {
            let _ = writeln!(out, "    <signal name=\"{name}\">");
            write_args(&mut out, &signal.signature, None);
            let _ = writeln!(out, "    </signal>");
        }

        for (name, property) in &interface.properties {
            let access = match property.access {
                Access::Read => "read",
                Access::Write => "write",
                Access::ReadWrite => "readwrite",
            };

            let _ = writeln!(
                out,
                "    <property name=\"{name}\" type=\"{}\" access=\"{access}\"/>",
                property.signature.as_str()
            );
        }

        let _ = writeln!(out, "  </interface>");
    }

    let _ = writeln!(out, "  <interface name=\"{INTROSPECTABLE}\">");
    let _ = writeln!(out, "    <method name=\"Introspect\">");
    let _ = writeln!(out, "      <arg type=\"s\" direction=\"out\"/>");
    let _ = writeln!(out, "    </method>");
    let _ = writeln!(out, "  </interface>");

    let _ = writeln!(out, "  <interface name=\"{PROPERTIES}\">");
    let _ = writeln!(out, "    <method name=\"Get\">");
    let _ = writeln!(out, "      <arg type=\"s\" direction=\"in\"/>");
    let _ = writeln!(out, "      <arg type=\"s\" direction=\"in\"/>");
    let _ = writeln!(out, "      <arg type=\"v\" direction=\"out\"/>");
    let _ = writeln!(out, "    </method>");
    let _ = writeln!(out, "    <method name=\"Set\">");
    let _ = writeln!(out, "      <arg type=\"s\" direction=\"in\"/>");
    let _ = writeln!(out, "      <arg type=\"s\" direction=\"in\"/>");
    let _ = writeln!(out, "      <arg type=\"v\" direction=\"in\"/>");
    let _ = writeln!(out, "    </method>");
    let _ = writeln!(out, "    <method name=\"GetAll\">");
    let _ = writeln!(out, "      <arg type=\"s\" direction=\"in\"/>");
    let _ = writeln!(out, "      <arg type=\"a{{sv}}\" direction=\"out\"/>");
    let _ = writeln!(out, "    </method>");
    let _ = writeln!(out, "  </interface>");

    let _ = writeln!(out, "  <interface name=\"{PEER}\">");
    let _ = writeln!(out, "    <method name=\"Ping\"/>");
    let _ = writeln!(out, "  </interface>");

    for child in children {
        let _ = writeln!(out, "  <node name=\"{child}\"/>");
    }

    out.push_str("</node>\n");
    out
}
