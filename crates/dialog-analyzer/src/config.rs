//! Process-wide configuration, loaded once from a single YAML file at startup.

use dialog_providers::ProvidersConfig;
use dialog_store::{MongoConfig, RabbitMqConfig, RedisConfig};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "etc/config.yaml";

/// Top-level analyzer configuration, deserialized from `CONFIG_PATH` (default
/// `etc/config.yaml`). Shares its shape with the gateway's configuration file so both
/// processes can read the same file in a single deployment.
#[derive(Clone, Debug, Deserialize)]
pub struct AnalyzerConfig {
    /// MongoDB connection settings (report archive).
    pub mongo: MongoConfig,
    /// Redis connection settings (transcript store).
    pub redis: RedisConfig,
    /// RabbitMQ connection settings (analysis job queue).
    pub rabbitmq: RabbitMqConfig,
    /// Provider credentials; only the Report-LLM block is used by this process.
    pub providers: ProvidersConfig,
}

impl AnalyzerConfig {
    /// Load configuration from the path named by `CONFIG_PATH`, or
    /// [`DEFAULT_CONFIG_PATH`] if unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match this shape.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
