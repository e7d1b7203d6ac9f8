//! Process-wide configuration, loaded once from a single YAML file at startup.

use dialog_engine::{DialogEngineConfig, VoiceEngineConfig};
use dialog_providers::ProvidersConfig;
use dialog_store::{MongoConfig, RabbitMqConfig, RedisConfig};
use serde::Deserialize;

/// SMTP settings for session alerting. Parsed so the configuration file round-trips, never
/// used to send mail.
#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Authentication username.
    pub username: String,
    /// Authentication password.
    pub password: String,
    /// Address alerts would be sent from.
    pub from: String,
    /// Addresses alerts would be sent to.
    #[serde(default)]
    pub to: Vec<String>,
}

/// Top-level gateway configuration, deserialized from `CONFIG_PATH` (default
/// `etc/config.yaml`).
#[derive(Clone, Debug, Deserialize)]
pub struct GatewayConfig {
    /// Address the HTTP/WS server binds to, e.g. `0.0.0.0:8080`.
    pub listen: String,
    /// MongoDB connection settings (report archive).
    pub mongo: MongoConfig,
    /// Redis connection settings (transcript store).
    pub redis: RedisConfig,
    /// RabbitMQ connection settings (analysis job queue).
    pub rabbitmq: RabbitMqConfig,
    /// SMTP settings, carried through but never used.
    pub smtp: SmtpConfig,
    /// Provider credentials for Chat-LLM, Report-LLM, TTS, and ASR.
    pub providers: ProvidersConfig,
    /// Dialog engine startup/steady-state parameters.
    #[serde(default)]
    pub engine: DialogEngineConfig,
    /// Voice engine startup parameters.
    #[serde(default)]
    pub voice: VoiceEngineConfig,
}

const DEFAULT_CONFIG_PATH: &str = "etc/config.yaml";

impl GatewayConfig {
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
