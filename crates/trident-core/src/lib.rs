pub mod artifact;
pub mod branch;
pub mod condition;
pub mod dag;
pub mod error;
pub mod executor;
pub mod model;
pub mod orchestration;
pub mod parser;
pub mod provider;
pub mod template;
pub mod value;

pub use artifact::ArtifactManager;
pub use error::{Result, TridentError};

use tracing::info;

/// Initialise a default tracing subscriber for the library consumer.
///
/// Call this once at program start. Uses `RUST_LOG` env var for filtering,
/// defaulting to `info` level.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).init();

    info!("trident tracing initialised");
}
