use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("file not found")]
    NotFound,

    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The port is still served by one of our own listeners.
    #[error("server already running on port {port}")]
    BindConflict { port: u16 },

    #[error("failed to bind port {port}: {source}")]
    BindFailure {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("no bindable port in {first}..={last}")]
    BindExhausted { first: u16, last: u16 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PreviewError {
    pub fn fetch(err: impl std::fmt::Display) -> Self {
        PreviewError::Fetch(err.to_string())
    }
}

pub type Result<T, E = PreviewError> = std::result::Result<T, E>;
