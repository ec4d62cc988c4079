use std::path::PathBuf;

use thiserror::Error;

/// Closed error taxonomy for the harness. Variants are matched on by
/// callers that need to decide how to recover (e.g. a session-breaking
/// error forces a rebuild of the session, a timeout may warrant an
/// interrupt instead of a hard failure).
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("container engine error: {0}")]
    Engine(#[from] docker_api::Error),

    #[error("session `{session}` is broken: {reason}")]
    Session { session: String, reason: String },

    #[error("command `{label}` failed: {reason}")]
    Command { label: String, reason: String },

    #[error("command `{label}` exceeded total timeout of {timeout_secs}s")]
    TotalTimeout { label: String, timeout_secs: u64 },

    #[error("command `{label}` produced no output for {timeout_secs}s")]
    NoOutputTimeout { label: String, timeout_secs: u64 },

    #[error("command `{label}` output was not valid unicode ({invalid_fraction:.2} of bytes undecodable)")]
    Unicode { label: String, invalid_fraction: f64 },

    #[error("failed to parse test log: {0}")]
    Parse(String),

    #[error("recipe not found for {org}/{repo}")]
    RecipeNotFound { org: String, repo: String },

    #[error("image build failed for `{image}`: {reason}")]
    ImageBuild { image: String, reason: String },

    #[error("io error at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Cbor(#[from] serde_cbor::Error),
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

impl HarnessError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        HarnessError::Config(msg.into())
    }

    /// Whether this error indicates the session's shell channel is no
    /// longer usable and must be torn down rather than retried.
    pub fn breaks_session(&self) -> bool {
        matches!(
            self,
            HarnessError::Session { .. }
                | HarnessError::TotalTimeout { .. }
                | HarnessError::Unicode { .. }
        )
    }
}
