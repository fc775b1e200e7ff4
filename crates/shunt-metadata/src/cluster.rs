use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use shunt_common::addr::{default_xport, parse_address};
use shunt_common::{Destination, Result, RouterError, DEFAULT_PORT};

use crate::session::{
    MetadataSession, Row, SessionError, SessionFactory, QUERY_METADATA,
    QUERY_PRIMARY_MEMBER, QUERY_STATUS,
};
use crate::types::{
    GroupMember, ManagedInstance, MemberRole, MemberState, ReplicaSetStatus, ServerMode,
};

/// Declared instances grouped per replica set, in metadata row order.
pub type InstancesByReplicaSet = BTreeMap<String, Vec<ManagedInstance>>;

/// Resolves cluster metadata into a labelled, quorum-verified view.
///
/// The resolver owns at most one metadata session at a time. `connect` pools
/// a session against the first reachable metadata server; the same session is
/// reused for the topology query and, when the addresses line up, for the
/// first live-state probe. Sessions are owned exclusively by the refresher
/// task and never shared across threads.
pub struct ClusterMetadata {
    user: String,
    password: String,
    connect_timeout: Duration,
    factory: Arc<dyn SessionFactory>,
    active: Option<ActiveSession>,
}

/// The pooled session together with the address it is bound to.
struct ActiveSession {
    session: Arc<dyn MetadataSession>,
    host: String,
    port: u16,
}

impl ClusterMetadata {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        connect_timeout: Duration,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            connect_timeout,
            factory,
            active: None,
        }
    }

    /// Connects to the first reachable candidate.
    ///
    /// Exactly one session is created per call; its `connect` is attempted
    /// against each candidate in order and the first success is pooled.
    /// Returns `false` (and pools nothing) when every candidate refuses.
    pub async fn connect(&mut self, candidates: &[Destination]) -> bool {
        self.active = None;
        let session = self.factory.create();
        for candidate in candidates {
            match session
                .connect(
                    &candidate.host,
                    candidate.port,
                    &self.user,
                    &self.password,
                    self.connect_timeout,
                )
                .await
            {
                Ok(()) => {
                    self.active = Some(ActiveSession {
                        session,
                        host: candidate.host.clone(),
                        port: candidate.port,
                    });
                    return true;
                }
                Err(err) => warn!("{}", err),
            }
        }
        false
    }

    /// Fetches the declared topology (Q1) and groups it per replica set.
    ///
    /// The full mapping is returned, not only `cluster_name`'s entry; the
    /// metadata server scopes the rows to the cluster, and callers pick the
    /// sets they care about.
    pub async fn fetch_instances_from_metadata_server(
        &self,
        cluster_name: &str,
    ) -> Result<InstancesByReplicaSet> {
        let active = self
            .active
            .as_ref()
            .ok_or(SessionError::NotConnected)
            .map_err(RouterError::from)?;

        let sql = format!("{}'{}'", QUERY_METADATA, cluster_name);
        let rows = active
            .session
            .query(&sql)
            .await
            .map_err(RouterError::from)?;

        let mut result = InstancesByReplicaSet::new();
        for row in &rows {
            let instance = parse_metadata_row(row);
            result
                .entry(instance.replicaset_name.clone())
                .or_default()
                .push(instance);
        }
        Ok(result)
    }

    /// Converges on a trustworthy live view of the replica set `name`.
    ///
    /// Members are probed in declared order: open a session if none is
    /// pooled for that address, fetch the primary member (Q2) and the live
    /// group state (Q3), and hand both to the quorum computation. Any
    /// failure along the way drops the session and advances to the next
    /// member. Each member's `mode` is updated in place.
    ///
    /// The error message raised when every member has been exhausted is a
    /// stable contract for operators.
    pub async fn update_replicaset_status(
        &mut self,
        name: &str,
        members: &mut [ManagedInstance],
    ) -> Result<ReplicaSetStatus> {
        for i in 0..members.len() {
            let (host, port) = (members[i].host.clone(), members[i].port);

            if !self.has_session_to(&host, port) && !self.open_session(&host, port).await {
                continue;
            }
            let Some(active) = self.active.as_ref() else {
                continue;
            };
            let session = Arc::clone(&active.session);

            let primary_uuid = match session.query(QUERY_PRIMARY_MEMBER).await {
                Ok(rows) => parse_primary_member(&rows),
                Err(err) => {
                    warn!("failed to fetch primary member from {}:{}: {}", host, port, err);
                    self.active = None;
                    continue;
                }
            };

            let live = match session.query(QUERY_STATUS).await {
                Ok(rows) => parse_group_members(&rows, &primary_uuid),
                Err(err) => {
                    warn!("failed to fetch group status from {}:{}: {}", host, port, err);
                    self.active = None;
                    continue;
                }
            };

            return Ok(check_replicaset_status(members, &live));
        }

        Err(RouterError::Metadata(format!(
            "Unable to fetch live group_replication member data from any server in replicaset '{}'",
            name
        )))
    }

    fn has_session_to(&self, host: &str, port: u16) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.host == host && active.port == port)
    }

    async fn open_session(&mut self, host: &str, port: u16) -> bool {
        self.active = None;
        let session = self.factory.create();
        match session
            .connect(host, port, &self.user, &self.password, self.connect_timeout)
            .await
        {
            Ok(()) => {
                self.active = Some(ActiveSession {
                    session,
                    host: host.to_string(),
                    port,
                });
                true
            }
            Err(err) => {
                warn!("{}", err);
                false
            }
        }
    }
}

/// Labels each declared member and computes the replica set's verdict.
///
/// A member missing from the live map or in any non-online state is
/// `Unavailable`; an online primary is `ReadWrite` (more than one live
/// primary is downgraded to single-primary semantics: all of them become
/// `ReadWrite`); other online members are `ReadOnly`. Live members unknown
/// to the declared list are ignored. The verdict requires a strict majority
/// of declared members online.
pub fn check_replicaset_status(
    members: &mut [ManagedInstance],
    live: &HashMap<String, GroupMember>,
) -> ReplicaSetStatus {
    let expected = members.len();
    let mut online = 0usize;
    let mut primary_found = false;

    for member in members.iter_mut() {
        match live.get(&member.server_uuid) {
            None => {
                member.mode = ServerMode::Unavailable;
                warn!(
                    "member {}:{} ({}) defined in metadata not found in actual replicaset",
                    member.host, member.port, member.server_uuid
                );
            }
            Some(found) if found.state == MemberState::Online => {
                if found.role == MemberRole::Primary {
                    member.mode = ServerMode::ReadWrite;
                    primary_found = true;
                } else {
                    member.mode = ServerMode::ReadOnly;
                }
                online += 1;
            }
            Some(_) => member.mode = ServerMode::Unavailable,
        }
    }

    // strict majority of the declared member count
    if online <= expected / 2 {
        ReplicaSetStatus::Unavailable
    } else if primary_found {
        ReplicaSetStatus::AvailableWritable
    } else {
        ReplicaSetStatus::AvailableReadOnly
    }
}

fn column<'a>(row: &'a Row, index: usize) -> Option<&'a str> {
    row.get(index).and_then(|cell| cell.as_deref())
}

/// Parses one Q1 row into a [`ManagedInstance`].
///
/// NULL numeric columns read as zero; a NULL classic address yields an empty
/// host with the default port; a NULL X address falls back to the
/// `port * 10` convention.
fn parse_metadata_row(row: &Row) -> ManagedInstance {
    let replicaset_name = column(row, 0).unwrap_or_default().to_string();
    let server_uuid = column(row, 1).unwrap_or_default().to_string();
    let role_text = column(row, 2).unwrap_or_default().to_string();
    let weight = column(row, 3)
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(0.0);
    let version_token = column(row, 4)
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(0);
    let location = column(row, 5).unwrap_or_default().to_string();

    let (host, port) = match column(row, 6).and_then(|addr| parse_address(addr, DEFAULT_PORT).ok())
    {
        Some(dest) => (dest.host, dest.port),
        None => (String::new(), DEFAULT_PORT),
    };
    if host.is_empty() {
        warn!(
            "instance {} in replicaset '{}' has no address in metadata; keeping it with default ports",
            server_uuid, replicaset_name
        );
    }

    let xport = match column(row, 7).and_then(|addr| parse_address(addr, DEFAULT_PORT).ok()) {
        Some(dest) => dest.port,
        None => default_xport(port),
    };

    ManagedInstance {
        replicaset_name,
        server_uuid,
        role_text,
        mode: ServerMode::Unavailable,
        weight,
        version_token,
        location,
        host,
        port,
        xport,
    }
}

/// Extracts the primary member's UUID from the Q2 result.
///
/// The status row is `(Variable_name, Value)`; the value is the final column
/// of the single row, and an empty string means no primary is elected.
fn parse_primary_member(rows: &[Row]) -> String {
    rows.first()
        .and_then(|row| row.last())
        .and_then(|cell| cell.clone())
        .unwrap_or_default()
}

/// Builds the `uuid -> member` map from the Q3 result.
///
/// A member is the primary exactly when its UUID matches Q2's answer.
fn parse_group_members(rows: &[Row], primary_uuid: &str) -> HashMap<String, GroupMember> {
    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        let uuid = column(row, 0).unwrap_or_default().to_string();
        let host = column(row, 1).unwrap_or_default().to_string();
        let port = column(row, 2)
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(0);
        let state = MemberState::parse(column(row, 3).unwrap_or_default());
        let role = if !primary_uuid.is_empty() && uuid == primary_uuid {
            MemberRole::Primary
        } else {
            MemberRole::Secondary
        };
        map.insert(
            uuid.clone(),
            GroupMember {
                uuid,
                host,
                port,
                state,
                role,
            },
        );
    }
    map
}
