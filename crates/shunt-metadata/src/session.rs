use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use thiserror::Error;

use shunt_common::RouterError;

/// Q1: declared topology from the metadata schema. The cluster name is
/// appended as a quoted literal.
pub const QUERY_METADATA: &str = "SELECT R.replicaset_name, I.mysql_server_uuid, I.role, I.weight, I.version_token, H.location, \
     I.addresses->>'$.mysqlClassic', I.addresses->>'$.mysqlX' \
     FROM mysql_innodb_cluster_metadata.clusters AS F \
     JOIN mysql_innodb_cluster_metadata.replicasets AS R ON F.cluster_id = R.cluster_id \
     JOIN mysql_innodb_cluster_metadata.instances AS I ON R.replicaset_id = I.replicaset_id \
     JOIN mysql_innodb_cluster_metadata.hosts AS H ON I.host_id = H.host_id \
     WHERE F.cluster_name = ";

/// Q2: primary member as seen by one node.
pub const QUERY_PRIMARY_MEMBER: &str =
    "show status like 'group_replication_primary_member'";

/// Q3: live group membership as seen by one node.
pub const QUERY_STATUS: &str = "SELECT member_id, member_host, member_port, member_state, @@group_replication_single_primary_mode \
     FROM performance_schema.replication_group_members \
     WHERE channel_name = 'group_replication_applier'";

/// One result row; NULL columns are `None`.
pub type Row = Vec<Option<String>>;

/// Failures reported by a metadata session.
///
/// The display strings are operator-facing contracts and are carried
/// verbatim into [`RouterError::Metadata`].
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Error connecting to MySQL server at {host}:{port}: {detail}")]
    ConnectFailed {
        host: String,
        port: u16,
        detail: String,
    },

    #[error("Error executing MySQL query: {0}")]
    QueryFailed(String),

    /// A query was issued before `connect` succeeded.
    #[error("Not connected")]
    NotConnected,
}

impl From<SessionError> for RouterError {
    fn from(err: SessionError) -> Self {
        RouterError::Metadata(err.to_string())
    }
}

/// One client session against a MySQL server.
///
/// A session starts disconnected; `connect` may be retried against different
/// hosts until one accepts (the resolver walks candidate lists this way).
/// Query result sets on the metadata path are always small, so rows are
/// buffered rather than streamed.
#[async_trait]
pub trait MetadataSession: Send + Sync {
    /// Opens the session to `host:port`, bounded by `timeout`.
    async fn connect(
        &self,
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<(), SessionError>;

    /// Runs `sql` and buffers the full result set.
    async fn query(&self, sql: &str) -> Result<Vec<Row>, SessionError>;
}

/// Capability for opening new metadata sessions.
///
/// The resolver receives this instead of reaching for any global state;
/// tests supply scripted fakes, production supplies [`MySqlSessionFactory`].
pub trait SessionFactory: Send + Sync {
    fn create(&self) -> Arc<dyn MetadataSession>;
}

/// Production session over the MySQL wire protocol.
pub struct MySqlSession {
    conn: tokio::sync::Mutex<Option<mysql_async::Conn>>,
}

impl MySqlSession {
    pub fn new() -> Self {
        Self {
            conn: tokio::sync::Mutex::new(None),
        }
    }
}

impl Default for MySqlSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataSession for MySqlSession {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let opts = mysql_async::OptsBuilder::default()
            .ip_or_hostname(host)
            .tcp_port(port)
            .user(Some(user))
            .pass(Some(password))
            .prefer_socket(false);

        let connect_failed = |detail: String| SessionError::ConnectFailed {
            host: host.to_string(),
            port,
            detail,
        };

        let conn = tokio::time::timeout(timeout, mysql_async::Conn::new(opts))
            .await
            .map_err(|_| connect_failed("connect timed out".to_string()))?
            .map_err(|err| connect_failed(err.to_string()))?;

        *self.conn.lock().await = Some(conn);
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, SessionError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(SessionError::NotConnected)?;
        let rows: Vec<mysql_async::Row> = conn
            .query(sql)
            .await
            .map_err(|err| SessionError::QueryFailed(err.to_string()))?;
        Ok(rows.iter().map(row_to_strings).collect())
    }
}

/// Production factory handing out fresh [`MySqlSession`]s.
pub struct MySqlSessionFactory;

impl SessionFactory for MySqlSessionFactory {
    fn create(&self) -> Arc<dyn MetadataSession> {
        Arc::new(MySqlSession::new())
    }
}

fn row_to_strings(row: &mysql_async::Row) -> Row {
    (0..row.len())
        .map(|i| match row.as_ref(i) {
            None | Some(mysql_async::Value::NULL) => None,
            Some(mysql_async::Value::Bytes(bytes)) => {
                Some(String::from_utf8_lossy(bytes).into_owned())
            }
            Some(other) => Some(other.as_sql(true).trim_matches('\'').to_string()),
        })
        .collect()
}
