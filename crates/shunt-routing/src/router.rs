use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use shunt_common::{Destination, Result, RoutingConfig};

use crate::connector::{BoxedStream, Connector, TcpConnector};
use crate::destinations::DestinationSource;
use crate::quarantine::Quarantine;
use crate::relay::relay;

/// Accepts client connections and relays each one to a selected backend.
///
/// Per accepted client the router obtains an ordered candidate list from its
/// destination source, attempts a bounded connect to each candidate in turn
/// (feeding the quarantine registry on failure, clearing it on success), and
/// hands the socket pair to the byte relay. A client for which every
/// candidate fails is closed without having received any data.
///
/// At most `max_connections` clients are relayed concurrently; clients
/// beyond the cap are rejected immediately rather than queued.
pub struct ConnectionRouter {
    config: RoutingConfig,
    source: DestinationSource,
    quarantine: Arc<Quarantine>,
    connector: Arc<dyn Connector>,
    slots: Arc<Semaphore>,
}

impl ConnectionRouter {
    pub fn new(config: RoutingConfig, source: DestinationSource) -> Self {
        let quarantine = Arc::new(Quarantine::new(config.max_connect_errors));
        Self::with_connector(config, source, quarantine, Arc::new(TcpConnector))
    }

    /// Builds a router with explicit quarantine and connector, letting the
    /// cache-backed selector share the registry and tests substitute fakes.
    pub fn with_connector(
        config: RoutingConfig,
        source: DestinationSource,
        quarantine: Arc<Quarantine>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(usize::from(config.max_connections)));
        Self {
            config,
            source,
            quarantine,
            connector,
            slots,
        }
    }

    pub fn quarantine(&self) -> Arc<Quarantine> {
        Arc::clone(&self.quarantine)
    }

    /// TCP accept loop. Runs until the shutdown signal flips.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("routing endpoint listening on {}", listener.local_addr()?);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => Arc::clone(&self).dispatch(stream, peer.to_string()),
                        Err(err) => warn!("failed to accept connection: {}", err),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("routing endpoint shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Local-socket accept loop, mirroring [`run`](Self::run).
    #[cfg(unix)]
    pub async fn run_unix(
        self: Arc<Self>,
        listener: UnixListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("routing endpoint listening on local socket");
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            Arc::clone(&self).dispatch(stream, "local-socket client".to_string())
                        }
                        Err(err) => warn!("failed to accept local-socket connection: {}", err),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("routing endpoint shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Hands one accepted client to a relay task, or rejects it at the cap.
    ///
    /// Rejection is a plain drop of the socket: no queueing, nothing written.
    fn dispatch<S>(self: Arc<Self>, client: S, peer: String)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
            warn!(
                "rejecting connection from {}: max_connections ({}) reached",
                peer, self.config.max_connections
            );
            return;
        };

        tokio::spawn(async move {
            let _permit = permit;
            match self.connect_backend().await {
                Some((dest, backend)) => {
                    debug!("routing {} to {}", peer, dest);
                    if let Err(err) = relay(client, backend, self.config.net_buffer_length).await {
                        warn!("relay for {} ended with error: {}", peer, err);
                    }
                }
                None => debug!("closing {}: no backend answered", peer),
            }
        });
    }

    /// Tries each candidate in order within the client connect budget.
    ///
    /// The per-candidate timeout is `connect_timeout`, clipped to whatever
    /// remains of `client_connect_timeout` for the whole dispatch.
    async fn connect_backend(&self) -> Option<(Destination, BoxedStream)> {
        let deadline = tokio::time::Instant::now() + self.config.client_connect_timeout;
        let candidates = self.source.candidates(&self.quarantine).await;
        if candidates.is_empty() {
            warn!("no destinations available for routing");
            return None;
        }

        for dest in candidates {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                warn!("giving up dispatch: client connect budget exhausted");
                return None;
            }
            let timeout = self.config.connect_timeout.min(remaining);

            match self.connector.connect(&dest, timeout).await {
                Ok(stream) => {
                    self.quarantine.record_success(&dest);
                    return Some((dest, stream));
                }
                Err(err) => {
                    warn!("failed to connect to backend {}: {}", dest, err);
                    if self.quarantine.record_failure(&dest) {
                        warn!(
                            "backend {} quarantined after {} connect errors",
                            dest, self.config.max_connect_errors
                        );
                    }
                }
            }
        }
        None
    }
}
