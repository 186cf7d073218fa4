use thiserror::Error;

/// Top-level error type for the trident-core library.
#[derive(Debug, Error)]
pub enum TridentError {
    /// Manifest or prompt-file parse error (unreadable file, invalid YAML,
    /// missing required frontmatter field).
    #[error("parse error: {0}")]
    Parse(String),

    /// DAG / edge-mapping / sub-workflow validation error.
    #[error("validation error: {0}")]
    Validation(String),

    /// Setup-phase error raised from `run` before any node executes.
    #[error("setup error: {0}")]
    Setup(String),

    /// Artifact read/write error.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// Orchestration substrate error (signal wait timeout, bad signal spec).
    #[error("orchestration error: {0}")]
    Orchestration(String),

    /// Branch (sub-workflow) execution error.
    #[error("branch error: {message} (iteration {iteration}/{max_iterations})")]
    Branch {
        message: String,
        iteration: u32,
        max_iterations: u32,
    },

    /// Provider (model/agent) resolution or call error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Wraps `std::io::Error`.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps `serde_json::Error`.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wraps `serde_yaml::Error`.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<crate::artifact::ArtifactError> for TridentError {
    fn from(err: crate::artifact::ArtifactError) -> Self {
        TridentError::Artifact(err.to_string())
    }
}

impl From<crate::provider::ProviderError> for TridentError {
    fn from(err: crate::provider::ProviderError) -> Self {
        TridentError::Provider(err.to_string())
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, TridentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TridentError::Validation("missing entrypoint".into());
        assert_eq!(err.to_string(), "validation error: missing entrypoint");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let trident_err: TridentError = io_err.into();
        assert!(matches!(trident_err, TridentError::Io(_)));
    }

    #[test]
    fn branch_error_display_includes_iteration() {
        let err = TridentError::Branch {
            message: "Max iterations reached".into(),
            iteration: 3,
            max_iterations: 3,
        };
        assert_eq!(
            err.to_string(),
            "branch error: Max iterations reached (iteration 3/3)"
        );
    }
}
