//! Shunt Common Types
//!
//! This crate provides the types shared by every component of the Shunt
//! router: backend addresses, endpoint configuration, and the workspace-wide
//! error enum.
//!
//! # Overview
//!
//! Shunt is a metadata-aware TCP router fronting a replicated MySQL cluster.
//! Clients connect to a routing endpoint; the endpoint forwards each byte
//! stream to one backend picked from either a static destination list or the
//! live metadata cache. This crate contains the vocabulary those components
//! agree on:
//!
//! - [`addr`] - the [`Destination`] address value
//! - [`config`] - routing/metadata-cache configuration with validation
//! - [`error`] - [`RouterError`] and the shared [`Result`] alias

pub mod addr;
pub mod config;
pub mod error;

pub use addr::{Destination, DEFAULT_PORT};
pub use config::{
    AccessMode, AppConfig, DestinationsConfig, MetadataConfig, RoutingConfig,
};
pub use error::{Result, RouterError};
