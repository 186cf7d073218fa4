use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("run '{0}' not found under the run index")]
    RunNotFound(String),
}
