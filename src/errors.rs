pub use anyhow::{anyhow, bail, Context, Error, Result};
pub use log::{debug, error, info, trace, warn};

/// Failures raised by the store, the formatter and the backend clients.
///
/// These travel inside `anyhow::Error`, callers that care about the kind
/// can `downcast_ref::<Failure>()`.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error("Storage failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid report format: expected object, got {0}")]
    InvalidReport(&'static str),
    #[error("{status} - {body}")]
    Transport {
        status: reqwest::StatusCode,
        body: String,
    },
}
