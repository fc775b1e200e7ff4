//! Scripted fake sessions for driving the resolver without a live server.
//!
//! Each fake session carries a set of addresses it accepts connections to and
//! per-query queues of scripted outcomes. The factory pre-allocates its
//! sessions and hands them out in order, so tests can assert how many
//! sessions a code path created and which connect attempts it made.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use shunt_common::Destination;
use shunt_metadata::cluster::ClusterMetadata;
use shunt_metadata::session::{
    MetadataSession, Row, SessionError, SessionFactory, QUERY_METADATA,
    QUERY_PRIMARY_MEMBER, QUERY_STATUS,
};
use shunt_metadata::types::{ManagedInstance, ServerMode};

pub type QueryOutcome = Result<Vec<Row>, String>;

#[derive(Default)]
struct Script {
    good_conns: HashSet<String>,
    metadata: VecDeque<QueryOutcome>,
    primary: VecDeque<QueryOutcome>,
    status: VecDeque<QueryOutcome>,
}

pub struct FakeSession {
    script: Mutex<Script>,
    connected: Mutex<bool>,
    events: Arc<Mutex<Vec<String>>>,
}

impl FakeSession {
    fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            script: Mutex::new(Script::default()),
            connected: Mutex::new(false),
            events,
        }
    }

    /// Addresses (`host:port`) this session will accept connections to.
    pub fn allow_connections(&self, addrs: &[&str]) {
        self.script.lock().unwrap().good_conns =
            addrs.iter().map(|addr| addr.to_string()).collect();
    }

    pub fn push_metadata(&self, outcome: QueryOutcome) {
        self.script.lock().unwrap().metadata.push_back(outcome);
    }

    pub fn push_primary(&self, outcome: QueryOutcome) {
        self.script.lock().unwrap().primary.push_back(outcome);
    }

    pub fn push_status(&self, outcome: QueryOutcome) {
        self.script.lock().unwrap().status.push_back(outcome);
    }
}

#[async_trait]
impl MetadataSession for FakeSession {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        _user: &str,
        _password: &str,
        _timeout: Duration,
    ) -> Result<(), SessionError> {
        let key = format!("{}:{}", host, port);
        let accepted = self.script.lock().unwrap().good_conns.contains(&key);
        if accepted {
            self.events.lock().unwrap().push(format!("connect-ok {}", key));
            *self.connected.lock().unwrap() = true;
            Ok(())
        } else {
            self.events.lock().unwrap().push(format!("connect-fail {}", key));
            Err(SessionError::ConnectFailed {
                host: host.to_string(),
                port,
                detail: "some error(42)".to_string(),
            })
        }
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, SessionError> {
        if !*self.connected.lock().unwrap() {
            return Err(SessionError::NotConnected);
        }
        let mut script = self.script.lock().unwrap();
        let queue = if sql.starts_with(QUERY_PRIMARY_MEMBER) {
            &mut script.primary
        } else if sql.starts_with(QUERY_STATUS) {
            &mut script.status
        } else if sql.starts_with(QUERY_METADATA) {
            &mut script.metadata
        } else {
            return Err(SessionError::QueryFailed(format!("unexpected query: {}", sql)));
        };
        match queue.pop_front() {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(detail)) => Err(SessionError::QueryFailed(detail)),
            None => Err(SessionError::QueryFailed(
                "no scripted response left".to_string(),
            )),
        }
    }
}

pub struct FakeSessionFactory {
    sessions: Vec<Arc<FakeSession>>,
    next: AtomicUsize,
    events: Arc<Mutex<Vec<String>>>,
}

impl FakeSessionFactory {
    /// Pre-allocates `capacity` sessions sharing one connect-event log.
    pub fn new(capacity: usize) -> Arc<Self> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sessions = (0..capacity)
            .map(|_| Arc::new(FakeSession::new(Arc::clone(&events))))
            .collect();
        Arc::new(Self {
            sessions,
            next: AtomicUsize::new(0),
            events,
        })
    }

    /// The `index`-th pre-allocated session, for scripting.
    pub fn session(&self, index: usize) -> &Arc<FakeSession> {
        &self.sessions[index]
    }

    /// How many sessions `create` has handed out.
    pub fn create_count(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }

    /// Connect attempts across all sessions, in order
    /// (`"connect-ok host:port"` / `"connect-fail host:port"`).
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl SessionFactory for FakeSessionFactory {
    fn create(&self) -> Arc<dyn MetadataSession> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .get(index)
            .expect("fake session factory exhausted")
            .clone()
    }
}

pub fn row(cells: &[&str]) -> Row {
    cells.iter().map(|cell| Some(cell.to_string())).collect()
}

pub fn row_opt(cells: &[Option<&str>]) -> Row {
    cells.iter().map(|cell| cell.map(str::to_string)).collect()
}

pub fn primary_rows(uuid: &str) -> Vec<Row> {
    vec![row(&["group_replication_primary_member", uuid])]
}

pub fn status_rows_all_online() -> Vec<Row> {
    vec![
        row(&["instance-1", "ubuntu", "3310", "ONLINE", "1"]),
        row(&["instance-2", "ubuntu", "3320", "ONLINE", "1"]),
        row(&["instance-3", "ubuntu", "3330", "ONLINE", "1"]),
    ]
}

pub fn typical_metadata_rows() -> Vec<Row> {
    vec![
        row(&["replicaset-1", "instance-1", "HA", "0", "0", "", "localhost:3310", "localhost:33100"]),
        row_opt(&[
            Some("replicaset-1"), Some("instance-2"), Some("HA"), Some("0"), Some("0"),
            Some(""), Some("localhost:3320"), None,
        ]),
        row_opt(&[
            Some("replicaset-1"), Some("instance-3"), Some("HA"), Some("0"), Some("0"),
            Some(""), Some("localhost:3330"), None,
        ]),
    ]
}

/// Metadata servers matching the typical three-node topology.
pub fn metadata_servers() -> Vec<Destination> {
    vec![
        Destination::new("localhost", 3310),
        Destination::new("localhost", 3320),
        Destination::new("localhost", 3330),
    ]
}

/// Declared instances matching the typical three-node topology, all modes
/// still `Unavailable`.
pub fn typical_instances() -> Vec<ManagedInstance> {
    [
        ("instance-1", 3310u16),
        ("instance-2", 3320),
        ("instance-3", 3330),
    ]
    .iter()
    .map(|(uuid, port)| ManagedInstance {
        replicaset_name: "replicaset-1".to_string(),
        server_uuid: uuid.to_string(),
        role_text: "HA".to_string(),
        mode: ServerMode::Unavailable,
        weight: 0.0,
        version_token: 0,
        location: String::new(),
        host: "localhost".to_string(),
        port: *port,
        xport: port * 10,
    })
    .collect()
}

pub fn resolver(factory: &Arc<FakeSessionFactory>) -> ClusterMetadata {
    ClusterMetadata::new(
        "user",
        "pass",
        Duration::from_secs(1),
        Arc::clone(factory) as Arc<dyn SessionFactory>,
    )
}

/// Connects the resolver to the first metadata server (session 0 accepts
/// `localhost:3310`).
pub async fn connect_to_first_metadata_server(
    factory: &Arc<FakeSessionFactory>,
    metadata: &mut ClusterMetadata,
) {
    factory.session(0).allow_connections(&["localhost:3310"]);
    assert!(metadata.connect(&metadata_servers()).await);
    assert_eq!(factory.create_count(), 1);
}
