//! Typed leaf errors. Orchestration layers wrap these with `anyhow`.

use std::path::PathBuf;

/// Fatal configuration problems, reported before any connect attempt.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required session attribute: {0}")]
    MissingField(&'static str),

    #[error("port must be nonzero")]
    InvalidPort,

    #[error("client certificate not found: {0}")]
    CertNotFound(PathBuf),
}
