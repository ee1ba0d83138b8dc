use crate::error::Result;

use super::{sasl, Connection, UnixTransport};

enum BusKind {
    Session,
    System,
    Address(String),
}

#[derive(Debug, Clone, Copy)]
enum AuthKind {
    /// SASL EXTERNAL using the current uid.
    Uid,
    /// The channel is already authenticated.
    None,
}

/// Builder of a [`Connection`].
///
/// # Examples
///
/// ```no_run
/// use dbus_sync::ConnectionBuilder;
///
/// let c = ConnectionBuilder::new().session_bus().build()?;
/// assert!(c.unique_name().is_some());
/// # Ok::<_, dbus_sync::Error>(())
/// ```
pub struct ConnectionBuilder {
    bus: BusKind,
    auth: AuthKind,
    hello: bool,
    unix_fd: bool,
}

impl ConnectionBuilder {
    /// Construct a new builder with the default configuration: the session
    /// bus, uid authentication, fd negotiation, and bus registration.
    pub fn new() -> Self {
        Self {
            bus: BusKind::Session,
            auth: AuthKind::Uid,
            hello: true,
            unix_fd: true,
        }
    }

    /// Connect to the session bus (default).
    pub fn session_bus(&mut self) -> &mut Self {
        self.bus = BusKind::Session;
        self
    }

    /// Connect to the system bus.
    pub fn system_bus(&mut self) -> &mut Self {
        self.bus = BusKind::System;
        self
    }

    /// Connect to an explicit D-Bus address such as
    /// `unix:path=/run/user/1000/bus`.
    pub fn address(&mut self, address: &str) -> &mut Self {
        self.bus = BusKind::Address(address.into());
        self
    }

    /// Skip the SASL handshake, for channels authenticated out-of-band.
    pub fn no_auth(&mut self) -> &mut Self {
        self.auth = AuthKind::None;
        self
    }

    /// Skip bus registration, for peer-to-peer connections that have no
    /// daemon to say hello to.
    pub fn no_hello(&mut self) -> &mut Self {
        self.hello = false;
        self
    }

    /// Skip unix-fd negotiation; sends carrying descriptors will fail.
    pub fn no_unix_fd(&mut self) -> &mut Self {
        self.unix_fd = false;
        self
    }

    /// Connect, authenticate and register a [`Connection`] with the
    /// current configuration.
    pub fn build(&self) -> Result<Connection> {
        let mut transport = match &self.bus {
            BusKind::Session => UnixTransport::session_bus()?,
            BusKind::System => UnixTransport::system_bus()?,
            BusKind::Address(address) => UnixTransport::connect(address)?,
        };

        if let AuthKind::Uid = self.auth {
            let outcome = sasl::authenticate(&mut transport, self.unix_fd)?;

            if self.unix_fd && !outcome.unix_fd {
                tracing::debug!("bus did not agree to unix fd passing");
            }
        }

        let connection = Connection::from_transport(Box::new(transport))?;

        if self.hello {
            connection.hello()?;
        }

        Ok(connection)
    }
}

impl Default for ConnectionBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
