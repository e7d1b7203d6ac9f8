//! Report-LLM adapter: a single non-streaming completion call.

use serde::{Deserialize, Serialize};

use crate::config::ReportLlmConfig;
use crate::error::{ProviderError, Result};

#[derive(Debug, Serialize)]
struct ReportRequestBody<'a> {
    input: ReportInput<'a>,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ReportInput<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReportResponseBody {
    output: ReportOutput,
}

#[derive(Debug, Deserialize)]
struct ReportOutput {
    #[serde(default)]
    text: String,
}

/// Report-LLM adapter.
#[derive(Debug, Clone)]
pub struct ReportLlm {
    config: ReportLlmConfig,
    http: reqwest::Client,
}

impl ReportLlm {
    /// Create a new adapter from the given configuration.
    #[must_use]
    pub fn new(config: ReportLlmConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Call the reporting model with `prompt`, returning the opaque JSON report.
    ///
    /// The provider sometimes wraps its JSON response in markdown code fences; those are
    /// stripped before parsing.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed as JSON.
    pub async fn call(&self, prompt: &str) -> Result<serde_json::Value> {
        let body = ReportRequestBody { input: ReportInput { prompt }, parameters: serde_json::json!({}) };

        let response = self
            .http
            .post(self.config.completion_url())
            .header("Authorization", self.config.authorization())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_preview = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body_preview });
        }

        let parsed: ReportResponseBody = response.json().await?;
        let cleaned = strip_markdown_fences(&parsed.output.text);
        serde_json::from_str(cleaned).map_err(ProviderError::Json)
    }
}

/// Strip an optional ```` ```json ... ``` ```` (or bare ```` ``` ```` ) fence the reporting
/// model sometimes wraps its JSON response in.
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else { return trimmed };
    let body = body.strip_prefix("json").unwrap_or(body);
    let body = body.strip_prefix('\n').unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_language_tagged_fence() {
        let wrapped = "```json\n{\"grade\": \"pass\"}\n```";
        assert_eq!(strip_markdown_fences(wrapped), "{\"grade\": \"pass\"}");
    }

    #[test]
    fn strips_bare_fence() {
        let wrapped = "```\n{\"grade\": \"pass\"}\n```";
        assert_eq!(strip_markdown_fences(wrapped), "{\"grade\": \"pass\"}");
    }

    #[test]
    fn passes_through_unfenced_json() {
        let plain = "{\"grade\": \"pass\"}";
        assert_eq!(strip_markdown_fences(plain), plain);
    }
}
