//! Shunt Routing Layer
//!
//! This crate accepts client connections and relays each one to a backend
//! picked by a policy-driven selector. Backends come either from a static
//! destination list or from the metadata cache's current snapshot, filtered
//! by role. Destinations that keep refusing connections are quarantined and
//! skipped until a connect to them succeeds again.
//!
//! # Components
//!
//! - [`destinations`] - the per-connection candidate selectors
//! - [`quarantine`] - the consecutive-failure registry
//! - [`connector`] - the backend-connect capability (trait + TCP binding)
//! - [`router`] - the accept loop and candidate failover
//! - [`relay`] - the full-duplex byte copy
//!
//! The router imposes no protocol framing: once a backend is picked, client
//! bytes flow through unchanged in both directions until either side closes.

pub mod connector;
pub mod destinations;
pub mod quarantine;
pub mod relay;
pub mod router;

pub use connector::{BoxedStream, Connector, TcpConnector};
pub use destinations::{CacheDestinations, DestinationSource, StaticDestinations};
pub use quarantine::Quarantine;
pub use relay::relay;
pub use router::ConnectionRouter;
