//! Shunt Metadata Cache
//!
//! This crate keeps the router's view of a replicated MySQL cluster fresh.
//! A background refresher polls one of the configured metadata servers for
//! the declared topology, validates it against live group-replication state
//! fetched from the members themselves, computes a quorum verdict, labels
//! each member with its read/write role, and publishes the result as an
//! immutable snapshot for the routing layer to consume.
//!
//! # Components
//!
//! - [`session`] - the metadata-session capability (trait + MySQL
//!   implementation) and the three opaque discovery queries
//! - [`cluster`] - the cluster-metadata resolver and quorum computation
//! - [`cache`] - the periodically refreshed, concurrently readable snapshot
//! - [`types`] - instances, group members, snapshots
//!
//! # Failure model
//!
//! Discovery failures never take the router down: a failed refresh cycle
//! keeps the previous snapshot in effect, and a replica set whose live state
//! cannot be fetched retains its previous sub-snapshot while the rest of the
//! cluster updates.

pub mod cache;
pub mod cluster;
pub mod session;
pub mod types;

pub use cache::MetadataCache;
pub use cluster::{check_replicaset_status, ClusterMetadata, InstancesByReplicaSet};
pub use session::{
    MetadataSession, MySqlSessionFactory, SessionError, SessionFactory,
};
pub use types::{
    ClusterSnapshot, GroupMember, ManagedInstance, MemberRole, MemberState,
    ReplicaSetSnapshot, ReplicaSetStatus, ServerMode,
};
