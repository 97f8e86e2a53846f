use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read payload {}: {source}", path.display())]
    Payload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to write summary: {0}")]
    SummaryIo(#[from] std::io::Error),

    #[error("failed to encode summary: {0}")]
    SummaryJson(#[from] serde_json::Error),
}
