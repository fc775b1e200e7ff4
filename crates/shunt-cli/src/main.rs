//! # Shunt CLI Entry Point
//!
//! Main binary for the Shunt router: a metadata-aware TCP proxy fronting a
//! replicated MySQL cluster.
//!
//! ## Usage
//!
//! ```bash
//! # Start a routing endpoint
//! shunt route -c shunt.json
//!
//! # Validate a configuration without starting anything
//! shunt route -c shunt.json --check
//! ```
//!
//! ## Configuration
//!
//! The config file is JSON with a `routing` section and, when the
//! destinations point at the metadata cache, a `metadata_cache` section:
//!
//! ```json
//! {
//!   "routing": {
//!     "destinations": "mysql://main/replicaset",
//!     "bind_address": "0.0.0.0:7002",
//!     "mode": "read-write"
//!   },
//!   "metadata_cache": {
//!     "bootstrap_servers": ["meta1:3310", "meta2:3310"],
//!     "user": "router",
//!     "password": "secret"
//!   }
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use tokio::sync::watch;
use tracing::info;

use shunt_common::{AppConfig, DestinationsConfig, MetadataConfig, RoutingConfig};
use shunt_metadata::cache::MetadataCache;
use shunt_metadata::cluster::ClusterMetadata;
use shunt_metadata::session::{MySqlSessionFactory, SessionFactory};
use shunt_routing::destinations::{CacheDestinations, DestinationSource, StaticDestinations};
use shunt_routing::router::ConnectionRouter;

#[derive(FromArgs)]
/// Shunt - metadata-aware TCP router for replicated MySQL clusters
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Route(RouteArgs),
}

/// Arguments for starting a routing endpoint.
#[derive(FromArgs)]
#[argh(subcommand, name = "route")]
/// start a routing endpoint
struct RouteArgs {
    /// path to the JSON configuration file
    #[argh(option, short = 'c')]
    config: PathBuf,

    /// validate the configuration and exit
    #[argh(switch)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level INFO, RUST_LOG overrides
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Route(args) => run_route(args).await,
    }
}

fn load_config(path: &PathBuf) -> Result<(RoutingConfig, Option<MetadataConfig>)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading configuration file {}", path.display()))?;
    let app: AppConfig =
        serde_json::from_str(&raw).context("parsing configuration file")?;
    let routing = app.routing.validate()?;
    let metadata = app
        .metadata_cache
        .as_ref()
        .map(|raw| raw.validate())
        .transpose()?;
    Ok((routing, metadata))
}

async fn run_route(args: RouteArgs) -> Result<()> {
    let (routing, metadata) = load_config(&args.config)?;
    if args.check {
        println!("configuration OK");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let source = match &routing.destinations {
        DestinationsConfig::Static(destinations) => {
            info!("routing to static destination list ({} entries)", destinations.len());
            DestinationSource::Static(StaticDestinations::new(destinations.clone()))
        }
        DestinationsConfig::MetadataCache { replicaset } => {
            let metadata = metadata.context(
                "destinations use the metadata cache but no metadata_cache section is configured",
            )?;
            let cache = MetadataCache::new(metadata.clone());
            let resolver = ClusterMetadata::new(
                metadata.user.clone(),
                metadata.password.clone(),
                metadata.connect_timeout,
                Arc::new(MySqlSessionFactory) as Arc<dyn SessionFactory>,
            );
            let _refresher = cache.spawn(resolver, replicaset.clone(), shutdown_rx.clone());
            info!(
                "routing replicaset '{}' via metadata cache (ttl {:?})",
                replicaset, metadata.ttl
            );
            DestinationSource::Cache(CacheDestinations::new(
                Arc::clone(&cache),
                replicaset.clone(),
                routing.mode,
            ))
        }
    };

    let router = Arc::new(ConnectionRouter::new(routing.clone(), source));
    let mut listeners = Vec::new();

    if let Some(bind) = &routing.bind_address {
        let listener = tokio::net::TcpListener::bind((bind.host.as_str(), bind.port))
            .await
            .with_context(|| format!("binding to {}", bind))?;
        listeners.push(tokio::spawn(
            Arc::clone(&router).run(listener, shutdown_rx.clone()),
        ));
    }

    #[cfg(unix)]
    if let Some(path) = &routing.socket {
        let _ = std::fs::remove_file(path);
        let listener = tokio::net::UnixListener::bind(path)
            .with_context(|| format!("binding to local socket {}", path.display()))?;
        listeners.push(tokio::spawn(
            Arc::clone(&router).run_unix(listener, shutdown_rx.clone()),
        ));
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for the shutdown signal")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    for listener in listeners {
        let _ = listener.await;
    }
    Ok(())
}
