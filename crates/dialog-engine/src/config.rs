//! Tunable parameters for one session's concurrency fabric. Deliberately separate from
//! `dialog-providers`/`dialog-store` configuration: these values shape the engine's own
//! channels and deadlines, never a remote provider's.

use std::time::Duration;

use serde::Deserialize;

/// Capacities of the five channels a [`crate::dialog::DialogEngine`] owns per session.
///
/// `out_audio` and `stop` are declared for forward compatibility but have no wired producer
/// in this implementation; see `DESIGN.md`.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct ChannelCapacities {
    /// Capacity of the `ai_history` channel.
    pub ai_history: usize,
    /// Capacity of the `user_history` channel.
    pub user_history: usize,
    /// Capacity of the `out_text` channel (LLM tokens destined for TTS).
    pub out_text: usize,
    /// Capacity of the `out_audio` channel.
    pub out_audio: usize,
    /// Capacity of the `stop` channel.
    pub stop: usize,
}

impl Default for ChannelCapacities {
    fn default() -> Self {
        Self { ai_history: 10, user_history: 10, out_text: 50, out_audio: 50, stop: 0 }
    }
}

/// Startup/steady-state parameters for a [`crate::dialog::DialogEngine`] session.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DialogEngineConfig {
    /// Channel capacities for this session's concurrency fabric.
    pub capacities: ChannelCapacities,
    /// Deadline for receiving the session-open frame.
    #[serde(with = "humantime_serde_secs")]
    pub open_frame_deadline: Duration,
    /// Idle deadline for client socket reads once the session is running.
    #[serde(with = "humantime_serde_secs")]
    pub socket_read_idle: Duration,
    /// Connect deadline for dialing a provider adapter.
    #[serde(with = "humantime_serde_secs")]
    pub provider_connect_deadline: Duration,
    /// Minimum round count a session must exceed before an analysis job is published.
    pub min_rounds: u32,
    /// Fixed greeting prompt sent to the Chat-LLM at session startup.
    pub greeting: String,
}

impl Default for DialogEngineConfig {
    fn default() -> Self {
        Self {
            capacities: ChannelCapacities::default(),
            open_frame_deadline: Duration::from_secs(10),
            socket_read_idle: Duration::from_secs(60),
            provider_connect_deadline: Duration::from_secs(10),
            min_rounds: 3,
            greeting: "你好呀".to_string(),
        }
    }
}

/// Startup parameters for a [`crate::voice::VoiceEngine`] session.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VoiceEngineConfig {
    /// Idle deadline for client socket reads.
    #[serde(with = "humantime_serde_secs")]
    pub socket_read_idle: Duration,
    /// Connect deadline for dialing the ASR provider.
    #[serde(with = "humantime_serde_secs")]
    pub provider_connect_deadline: Duration,
}

impl Default for VoiceEngineConfig {
    fn default() -> Self {
        Self {
            socket_read_idle: Duration::from_secs(60),
            provider_connect_deadline: Duration::from_secs(10),
        }
    }
}

/// `serde_with`-free helper for deserializing plain integer seconds into a [`Duration`],
/// matching the YAML config convention used throughout this workspace (no nested units).
mod humantime_serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacities_match_spec() {
        let capacities = ChannelCapacities::default();
        assert_eq!(capacities.ai_history, 10);
        assert_eq!(capacities.user_history, 10);
        assert_eq!(capacities.out_text, 50);
        assert_eq!(capacities.out_audio, 50);
        assert_eq!(capacities.stop, 0);
    }

    #[test]
    fn default_min_rounds_matches_spec() {
        assert_eq!(DialogEngineConfig::default().min_rounds, 3);
    }
}
