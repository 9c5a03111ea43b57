//! Log output setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use meshbook_types::{LogConfig, LogFormat, MeshbookError, Result};

/// Install the global subscriber. `RUST_LOG`, when set, wins over the
/// configured level.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| MeshbookError::Configuration(format!("log level {:?}: {e}", config.level)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init(),
        LogFormat::Console => registry.with(fmt::layer().with_target(true)).try_init(),
    };
    installed.map_err(|e| MeshbookError::Configuration(format!("logging: {e}")))
}
