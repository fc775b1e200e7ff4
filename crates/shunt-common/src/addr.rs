use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Result, RouterError};

/// Default classic-protocol port used when an address omits one.
pub const DEFAULT_PORT: u16 = 3306;

/// A routable backend address.
///
/// `host` and `port` identify the classic-protocol endpoint. `xport` carries
/// the X-protocol port reported by cluster metadata, or the `port * 10`
/// convention when the metadata omits it.
///
/// Destinations are plain values and are copied freely. Equality and hashing
/// cover `(host, port)` only, so the same endpoint compares equal regardless
/// of the X port it was built with.
#[derive(Debug, Clone, Eq)]
pub struct Destination {
    /// Hostname or IP address of the backend
    pub host: String,
    /// Classic-protocol TCP port
    pub port: u16,
    /// X-protocol TCP port
    pub xport: u16,
}

impl Destination {
    /// Creates a destination with the conventional X port (`port * 10`).
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            xport: default_xport(port),
        }
    }

    /// Creates a destination with an explicit X port.
    pub fn with_xport(host: impl Into<String>, port: u16, xport: u16) -> Self {
        Self {
            host: host.into(),
            port,
            xport,
        }
    }

    /// A destination is routable when it names a host and a non-zero port.
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && self.port > 0
    }
}

impl PartialEq for Destination {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Hash for Destination {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// X-protocol port convention applied when metadata does not report one.
pub fn default_xport(port: u16) -> u16 {
    port.wrapping_mul(10)
}

/// Parses `host[:port]` into a [`Destination`], applying `default_port` when
/// the port is absent.
///
/// Bracketed IPv6 literals (`[::1]:3306`) are supported; a bare address with
/// multiple colons and no brackets is treated as a portless IPv6 host.
pub fn parse_address(value: &str, default_port: u16) -> Result<Destination> {
    let invalid =
        || RouterError::Config(format!("invalid destination address '{}'", value));

    let value = value.trim();
    if value.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = value.strip_prefix('[') {
        // [v6-host] or [v6-host]:port
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
            None if tail.is_empty() => default_port,
            None => return Err(invalid()),
        };
        return Ok(Destination::new(host, port));
    }

    match value.rsplit_once(':') {
        // more than one colon without brackets: portless IPv6 host
        Some((head, _)) if head.contains(':') => Ok(Destination::new(value, default_port)),
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            Ok(Destination::new(host, port))
        }
        None => Ok(Destination::new(value, default_port)),
    }
}
