use thiserror::Error;

/// Errors surfaced by the routing core.
///
/// Several display strings are operator-facing contracts (they appear in logs
/// that tooling greps for), so variants carrying a preformatted message render
/// it verbatim.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Invalid configuration. Fatal at startup; never raised afterwards.
    #[error("{0}")]
    Config(String),

    /// Metadata discovery failed. The previous snapshot stays in effect and
    /// the service continues.
    #[error("{0}")]
    Metadata(String),

    /// A connect to a backend destination failed.
    #[error("Connection error: {0}")]
    Connect(String),

    /// One relay direction failed mid-copy.
    #[error("Relay error: {0}")]
    Relay(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RouterError>;
