//! Chat-LLM adapter: HTTP + server-sent events, incremental token streaming.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use crate::config::ChatLlmConfig;
use crate::error::{ProviderError, Result};

/// One incremental token frame from the Chat-LLM stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatToken {
    /// Monotonic id of this token within the stream, when the provider supplies one.
    pub id: Option<u64>,
    /// Session id fixed by the provider on the first token of a conversation.
    pub session_id: String,
    /// The delta content for this token (incremental output).
    pub content: String,
    /// Non-empty once the provider signals the turn is complete.
    pub finish: String,
}

#[derive(Debug, Deserialize)]
struct RawChatData {
    output: RawChatOutput,
}

#[derive(Debug, Deserialize)]
struct RawChatOutput {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    finish_reason: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    input: ChatInput<'a>,
    parameters: ChatParameters,
}

#[derive(Debug, Serialize)]
struct ChatInput<'a> {
    prompt: &'a str,
    session_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatParameters {
    incremental_output: bool,
}

/// Chat-LLM adapter.
#[derive(Debug, Clone)]
pub struct ChatLlm {
    config: ChatLlmConfig,
    http: reqwest::Client,
}

impl ChatLlm {
    /// Create a new adapter from the given configuration.
    #[must_use]
    pub fn new(config: ChatLlmConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Begin a streamed call; `session_id` may be empty for the first turn, in which case
    /// the provider assigns one and every [`ChatToken`] thereafter carries it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built or the initial connection fails.
    pub fn stream_call(&self, prompt: &str, session_id: &str) -> Result<ChatCursor> {
        let body = ChatRequestBody {
            input: ChatInput { prompt, session_id },
            parameters: ChatParameters { incremental_output: true },
        };

        let request = self
            .http
            .post(self.config.completion_url())
            .header("Authorization", self.config.authorization())
            .header("X-DashScope-SSE", "enable")
            .json(&body);

        let source = EventSource::new(request)
            .map_err(|e| ProviderError::Protocol(format!("failed to open event source: {e}")))?;

        Ok(ChatCursor { source })
    }
}

/// A lazy, finite cursor over incremental Chat-LLM tokens.
#[derive(Debug)]
pub struct ChatCursor {
    source: EventSource,
}

impl ChatCursor {
    /// Read the next token, or `None` at end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection drops or a frame fails to parse.
    pub async fn next(&mut self) -> Option<Result<ChatToken>> {
        loop {
            match self.source.next().await {
                None => return None,
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(msg))) => {
                    if msg.data == "[DONE]" {
                        return None;
                    }
                    let raw: RawChatData = match serde_json::from_str(&msg.data) {
                        Ok(raw) => raw,
                        Err(e) => return Some(Err(ProviderError::Json(e))),
                    };
                    let id = msg.id.parse::<u64>().ok();
                    return Some(Ok(ChatToken {
                        id,
                        session_id: raw.output.session_id,
                        content: raw.output.text,
                        finish: raw.output.finish_reason,
                    }));
                }
                Some(Err(reqwest_eventsource::Error::StreamEnded)) => return None,
                Some(Err(e)) => return Some(Err(ProviderError::Protocol(e.to_string()))),
            }
        }
    }

    /// Close the underlying event source early.
    pub fn close(&mut self) {
        self.source.close();
    }
}
