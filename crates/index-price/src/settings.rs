//! Configuration loading from `.env` and `INDEX_*` environment variables

use anyhow::Context;
use config::{Config, Environment};
use tracing::debug;

use index_core::IndexConfig;

pub const ENV_PREFIX: &str = "INDEX";

/// Load configuration, reading a `.env` file first if one exists
pub fn load() -> anyhow::Result<IndexConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded environment from {}", path.display());
    }
    from_environment(Environment::with_prefix(ENV_PREFIX))
}

/// Overlay `env` on the defaults and validate the result
pub fn from_environment(env: Environment) -> anyhow::Result<IndexConfig> {
    let settings = Config::builder()
        .add_source(env.try_parsing(true))
        .build()
        .context("Failed to read configuration")?;

    let config: IndexConfig = settings
        .try_deserialize()
        .context("Failed to parse configuration")?;
    config.validate()?;

    Ok(config)
}
