use std::collections::BTreeMap;
use std::time::Instant;

use shunt_common::{AccessMode, Destination};

/// Computed availability of a single replica-set member.
///
/// Set by the quorum computation on every refresh; a member starts out
/// `Unavailable` until live group state proves otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Unavailable,
    ReadOnly,
    ReadWrite,
}

/// A replica-set member as declared by the cluster metadata schema.
///
/// `server_uuid` is the member's identity across refresh cycles; it is an
/// opaque byte string and is never parsed. `role_text` is informational
/// metadata ("HA", ...) and plays no part in routing decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedInstance {
    pub replicaset_name: String,
    pub server_uuid: String,
    pub role_text: String,
    pub mode: ServerMode,
    pub weight: f32,
    pub version_token: u32,
    pub location: String,
    pub host: String,
    pub port: u16,
    pub xport: u16,
}

impl ManagedInstance {
    /// The routable address of this member.
    pub fn destination(&self) -> Destination {
        Destination::with_xport(self.host.clone(), self.port, self.xport)
    }

    /// Whether this member serves the given access mode.
    pub fn matches_mode(&self, mode: AccessMode) -> bool {
        match mode {
            AccessMode::ReadWrite => self.mode == ServerMode::ReadWrite,
            AccessMode::ReadOnly => self.mode == ServerMode::ReadOnly,
        }
    }
}

/// Live state reported by a group-replication member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Online,
    Offline,
    Recovering,
    Unreachable,
    Other,
}

impl MemberState {
    /// Parses the `member_state` column. Unknown strings map to `Other`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "ONLINE" => Self::Online,
            "OFFLINE" => Self::Offline,
            "RECOVERING" => Self::Recovering,
            "UNREACHABLE" => Self::Unreachable,
            _ => Self::Other,
        }
    }
}

/// Role of a live member within its replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Primary,
    Secondary,
}

/// One live participant of a replication group, as reported by a running
/// cluster node.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub uuid: String,
    pub host: String,
    pub port: u16,
    pub state: MemberState,
    pub role: MemberRole,
}

/// Availability verdict for a whole replica set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaSetStatus {
    /// Quorum held and a primary is elected.
    AvailableWritable,
    /// Quorum held but no primary is elected.
    AvailableReadOnly,
    /// Less than a strict majority of declared members is online.
    Unavailable,
}

/// Labelled members of one replica set at one refresh instant.
///
/// `members` preserves the metadata's declared order.
#[derive(Debug, Clone)]
pub struct ReplicaSetSnapshot {
    pub name: String,
    pub members: Vec<ManagedInstance>,
    pub status: ReplicaSetStatus,
}

/// Immutable view of the whole cluster at one refresh instant.
///
/// Snapshots are published behind an atomic swap; a consumer holding one
/// keeps seeing a consistent view until it releases its reference.
/// `generation` increases monotonically with each successful publish.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub replicasets: BTreeMap<String, ReplicaSetSnapshot>,
    pub generation: u64,
    pub acquired_at: Instant,
}

impl ClusterSnapshot {
    /// The pre-discovery snapshot: no replica sets, generation zero.
    pub fn empty() -> Self {
        Self {
            replicasets: BTreeMap::new(),
            generation: 0,
            acquired_at: Instant::now(),
        }
    }
}
