//! Crate-level error handling.
//!
//! Each profiler component keeps its own error type deriving `thiserror::Error`
//! (e.g. [`TunnelError`], [`FetchError`]); this module provides the top-level
//! enum they aggregate into at the CLI boundary, plus the crate-wide `Result`
//! alias.
//!
//! [`TunnelError`]: crate::profiler::tunnel::TunnelError
//! [`FetchError`]: crate::profiler::fetch::FetchError

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PodProfError>;

/// Top-level error for the podprof CLI.
#[derive(Debug, Error)]
pub enum PodProfError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] crate::profiler::session::SessionError),

    #[error(transparent)]
    Probe(#[from] crate::profiler::pod_status::ProbeError),

    #[error("required external tool not found in PATH: {0}")]
    MissingTool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize output: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while loading or saving configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config file: {0}")]
    ParsingFailed(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}
