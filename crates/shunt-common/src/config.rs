use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::addr::{parse_address, Destination, DEFAULT_PORT};
use crate::error::{Result, RouterError};

/// Address a routing endpoint binds to when only `bind_port` is given.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Access mode requested for a routing endpoint.
///
/// `ReadWrite` endpoints route to the replica set's primary, `ReadOnly`
/// endpoints to its secondaries. The option is required even for static
/// destination lists, where it only documents intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    /// Parses the `mode` option (`read-write` or `read-only`, case-insensitive).
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "read-write" => Ok(Self::ReadWrite),
            "read-only" => Ok(Self::ReadOnly),
            other => Err(RouterError::Config(format!(
                "option mode is invalid; valid are read-write, read-only (was '{}')",
                other
            ))),
        }
    }
}

/// Where a routing endpoint finds its backends.
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationsConfig {
    /// Fixed address list served round-robin.
    Static(Vec<Destination>),
    /// Backends resolved at dispatch time from the metadata cache for the
    /// named replica set.
    MetadataCache { replicaset: String },
}

impl DestinationsConfig {
    /// Parses the `destinations` option.
    ///
    /// Accepted forms:
    /// - `mysql://<source>/replicaset[/<name>]` - metadata-cache backed
    /// - `fabric+cache://<source>/group[/<name>]` - legacy alias
    /// - comma-separated `host[:port]` list, default port 3306
    ///
    /// For the URI forms the replica-set name is the segment after the
    /// command, falling back to the URI authority when absent.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(RouterError::Config(
                "option destinations is required and needs a value".into(),
            ));
        }
        match value.split_once("://") {
            Some((scheme, rest)) => Self::parse_uri(scheme, rest, value),
            None => Self::parse_list(value),
        }
    }

    fn parse_uri(scheme: &str, rest: &str, value: &str) -> Result<Self> {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let command = segments.next().unwrap_or("").to_ascii_lowercase();

        match scheme.to_ascii_lowercase().as_str() {
            "mysql" => {
                if command != "replicaset" {
                    return Err(RouterError::Config(format!(
                        "option destinations has an invalid metadata cache command in URI; was '{}'",
                        command
                    )));
                }
            }
            "fabric+cache" => {
                if command != "group" {
                    return Err(RouterError::Config(format!(
                        "option destinations has an invalid Fabric command in URI; was '{}'",
                        command
                    )));
                }
            }
            other => {
                return Err(RouterError::Config(format!(
                    "option destinations has an invalid URI scheme '{}' for URI {}",
                    other, value
                )));
            }
        }

        let replicaset = segments.next().unwrap_or(authority);
        if replicaset.is_empty() {
            return Err(RouterError::Config(format!(
                "option destinations is missing a replicaset name in URI {}",
                value
            )));
        }
        Ok(Self::MetadataCache {
            replicaset: replicaset.to_string(),
        })
    }

    fn parse_list(value: &str) -> Result<Self> {
        let empty_element = || {
            RouterError::Config(format!(
                "option destinations: empty address found in destination list (was '{}')",
                value
            ))
        };

        if value.starts_with(',') || value.ends_with(',') {
            return Err(empty_element());
        }

        let mut destinations = Vec::new();
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(empty_element());
            }
            let dest = parse_address(part, DEFAULT_PORT)?;
            if !dest.is_valid() {
                return Err(RouterError::Config(format!(
                    "option destinations has an invalid destination address '{}'",
                    part
                )));
            }
            destinations.push(dest);
        }
        Ok(Self::Static(destinations))
    }
}

/// Validated configuration for one routing endpoint.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub destinations: DestinationsConfig,
    /// TCP listener address; at least one of `bind_address` / `socket` is set.
    pub bind_address: Option<Destination>,
    /// Local-socket listener path.
    pub socket: Option<PathBuf>,
    pub mode: AccessMode,
    /// Per-destination connect timeout.
    pub connect_timeout: Duration,
    /// Bound on one whole dispatch (candidate iteration included).
    pub client_connect_timeout: Duration,
    /// Concurrently relayed connection cap; excess clients are rejected.
    pub max_connections: u16,
    /// Consecutive connect failures before a destination is quarantined.
    pub max_connect_errors: u32,
    /// Relay buffer size per direction, in bytes.
    pub net_buffer_length: usize,
}

/// On-disk shape of the `routing` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRoutingConfig {
    pub destinations: String,
    #[serde(default)]
    pub bind_address: Option<String>,
    #[serde(default)]
    pub bind_port: Option<u16>,
    #[serde(default)]
    pub socket: Option<PathBuf>,
    pub mode: String,
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout: u16,
    #[serde(default = "defaults::client_connect_timeout")]
    pub client_connect_timeout: u32,
    #[serde(default = "defaults::max_connections")]
    pub max_connections: u16,
    #[serde(default = "defaults::max_connect_errors")]
    pub max_connect_errors: u32,
    #[serde(default = "defaults::net_buffer_length")]
    pub net_buffer_length: u32,
}

mod defaults {
    pub fn connect_timeout() -> u16 {
        1
    }
    pub fn client_connect_timeout() -> u32 {
        9
    }
    pub fn max_connections() -> u16 {
        512
    }
    pub fn max_connect_errors() -> u32 {
        100
    }
    pub fn net_buffer_length() -> u32 {
        16384
    }
    pub fn metadata_ttl() -> u64 {
        5
    }
    pub fn metadata_connect_timeout() -> u64 {
        1
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    option: &str,
    value: T,
    min: T,
    max: T,
) -> Result<T> {
    if value < min || value > max {
        return Err(RouterError::Config(format!(
            "option {} needs value between {} and {} inclusive (was {})",
            option, min, max, value
        )));
    }
    Ok(value)
}

impl RawRoutingConfig {
    /// Validates every option and produces the runtime configuration.
    pub fn validate(&self) -> Result<RoutingConfig> {
        let destinations = DestinationsConfig::parse(&self.destinations)?;
        let mode = AccessMode::parse(&self.mode)?;

        let bind_address = match (&self.bind_address, self.bind_port) {
            (None, None) => None,
            (None, Some(port)) => Some(Destination::new(DEFAULT_BIND_ADDRESS, port)),
            (Some(addr), port) => {
                let dest = parse_address(addr, port.unwrap_or(0))?;
                // a portless bind address counts as unset for the check below
                if dest.port == 0 {
                    None
                } else {
                    Some(dest)
                }
            }
        };

        if bind_address.is_none() && self.socket.is_none() {
            return Err(RouterError::Config(
                "either bind_address or socket option needs to be supplied, or both".into(),
            ));
        }

        let connect_timeout =
            check_range("connect_timeout", self.connect_timeout, 1, u16::MAX)?;
        let client_connect_timeout = check_range(
            "client_connect_timeout",
            self.client_connect_timeout,
            2,
            31_536_000,
        )?;
        let max_connections =
            check_range("max_connections", self.max_connections, 1, u16::MAX)?;
        let max_connect_errors =
            check_range("max_connect_errors", self.max_connect_errors, 1, u32::MAX)?;
        let net_buffer_length =
            check_range("net_buffer_length", self.net_buffer_length, 1024, 1_048_576)?;

        Ok(RoutingConfig {
            destinations,
            bind_address,
            socket: self.socket.clone(),
            mode,
            connect_timeout: Duration::from_secs(u64::from(connect_timeout)),
            client_connect_timeout: Duration::from_secs(u64::from(client_connect_timeout)),
            max_connections,
            max_connect_errors,
            net_buffer_length: net_buffer_length as usize,
        })
    }
}

/// Validated metadata-cache configuration.
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Metadata servers tried in order by the refresher.
    pub bootstrap_servers: Vec<Destination>,
    pub user: String,
    pub password: String,
    /// Interval between refresh cycles.
    pub ttl: Duration,
    /// Connect timeout for metadata sessions.
    pub connect_timeout: Duration,
}

/// On-disk shape of the `metadata_cache` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMetadataConfig {
    pub bootstrap_servers: Vec<String>,
    pub user: String,
    pub password: String,
    #[serde(default = "defaults::metadata_ttl")]
    pub ttl: u64,
    #[serde(default = "defaults::metadata_connect_timeout")]
    pub connect_timeout: u64,
}

impl RawMetadataConfig {
    pub fn validate(&self) -> Result<MetadataConfig> {
        if self.bootstrap_servers.is_empty() {
            return Err(RouterError::Config(
                "option bootstrap_servers needs at least one address".into(),
            ));
        }
        let bootstrap_servers = self
            .bootstrap_servers
            .iter()
            .map(|addr| parse_address(addr, DEFAULT_PORT))
            .collect::<Result<Vec<_>>>()?;
        let ttl = check_range("ttl", self.ttl, 1, 31_536_000)?;
        let connect_timeout = check_range("connect_timeout", self.connect_timeout, 1, 65_535)?;

        Ok(MetadataConfig {
            bootstrap_servers,
            user: self.user.clone(),
            password: self.password.clone(),
            ttl: Duration::from_secs(ttl),
            connect_timeout: Duration::from_secs(connect_timeout),
        })
    }
}

/// Top-level config file: one routing endpoint plus an optional metadata
/// cache feeding it.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub routing: RawRoutingConfig,
    #[serde(default)]
    pub metadata_cache: Option<RawMetadataConfig>,
}
