//! Provider credentials and endpoint configuration.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Chat-LLM (Bailian-style) provider configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatLlmConfig {
    /// Application ID.
    pub app_id: String,
    /// API key.
    pub api_key: SecretString,
}

impl ChatLlmConfig {
    /// Completion endpoint for this app.
    #[must_use]
    pub fn completion_url(&self) -> String {
        format!("https://dashscope.aliyuncs.com/api/v1/apps/{}/completion", self.app_id)
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }
}

/// Report-LLM provider configuration. Shares the Bailian-style completion endpoint shape.
#[derive(Clone, Debug, Deserialize)]
pub struct ReportLlmConfig {
    /// Application ID.
    pub app_id: String,
    /// API key.
    pub api_key: SecretString,
}

impl ReportLlmConfig {
    /// Completion endpoint for this app.
    #[must_use]
    pub fn completion_url(&self) -> String {
        format!("https://dashscope.aliyuncs.com/api/v1/apps/{}/completion", self.app_id)
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }
}

/// TTS provider configuration, covering both the bidirectional and unary endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct TtsConfig {
    /// Bidirectional (streaming) websocket endpoint.
    pub url_bidi: String,
    /// Unary websocket endpoint.
    pub url_unary: String,
    /// Application key.
    pub app_key: String,
    /// Access key.
    pub access_key: SecretString,
    /// Resource ID (voice model).
    pub resource_id: String,
    /// Default speaker/voice id.
    pub speaker: String,
}

impl TtsConfig {
    /// Access key, exposed.
    #[must_use]
    pub fn access_key(&self) -> &str {
        self.access_key.expose_secret()
    }
}

/// ASR provider configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct AsrConfig {
    /// Bidirectional streaming websocket endpoint.
    pub url: String,
    /// Application key.
    pub app_key: String,
    /// Access key.
    pub access_key: SecretString,
    /// Resource ID.
    pub resource_id: String,
}

impl AsrConfig {
    /// Access key, exposed.
    #[must_use]
    pub fn access_key(&self) -> &str {
        self.access_key.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_llm_completion_url_embeds_app_id() {
        let config = ChatLlmConfig { app_id: "app-123".into(), api_key: SecretString::from("k".to_string()) };
        assert_eq!(
            config.completion_url(),
            "https://dashscope.aliyuncs.com/api/v1/apps/app-123/completion"
        );
        assert_eq!(config.authorization(), "Bearer k");
    }

    #[test]
    fn tts_config_exposes_access_key() {
        let config = TtsConfig {
            url_bidi: "wss://example/bidi".into(),
            url_unary: "wss://example/unary".into(),
            app_key: "app".into(),
            access_key: SecretString::from("secret".to_string()),
            resource_id: "res".into(),
            speaker: "zh_female_1".into(),
        };
        assert_eq!(config.access_key(), "secret");
    }
}

/// Aggregate configuration for all five provider adapters.
#[derive(Clone, Debug, Deserialize)]
pub struct ProvidersConfig {
    /// Chat-LLM credentials.
    pub chat: ChatLlmConfig,
    /// Report-LLM credentials.
    pub report: ReportLlmConfig,
    /// TTS credentials and endpoints.
    pub tts: TtsConfig,
    /// ASR credentials and endpoint.
    pub asr: AsrConfig,
}
