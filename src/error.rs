use std::time::Duration;

use thiserror::Error;

/// Terminal failure of a playback job. Every variant is recovered inside the
/// job itself; the guild queue only ever sees "finished".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("voice channel no longer exists")]
    ChannelGone,
    #[error("voice connection not ready after {0:?}")]
    ConnectTimeout(Duration),
    #[error("voice connection failed: {0}")]
    Connect(String),
    #[error("playback failed: {0}")]
    Playback(String),
    #[error("soundboard dispatch failed: {0}")]
    Dispatch(String),
}

impl JobError {
    /// Text posted back to the requester when the job ends on this error.
    pub fn user_message(&self) -> &'static str {
        match self {
            JobError::ChannelGone => "⚠️ The voice channel no longer exists.",
            JobError::ConnectTimeout(_) | JobError::Connect(_) => {
                "⚠️ Could not join the voice channel."
            }
            JobError::Playback(_) => "⚠️ Something went wrong while playing the sound.",
            JobError::Dispatch(_) => {
                "⚠️ Could not play the soundboard sound (check the bot's permissions)."
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobError::ChannelGone => "channel_gone",
            JobError::ConnectTimeout(_) => "connect_timeout",
            JobError::Connect(_) => "connect_error",
            JobError::Playback(_) => "playback_error",
            JobError::Dispatch(_) => "dispatch_error",
        }
    }
}

/// Best effort; never fatal to a job.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable: set one of {}", .0.join(", "))]
    Missing(&'static [&'static str]),
    #[error("invalid value for {key}: {value:?} is not a Discord id")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_failure_has_a_user_message() {
        let all = [
            JobError::ChannelGone,
            JobError::ConnectTimeout(Duration::from_secs(20)),
            JobError::Connect("refused".into()),
            JobError::Playback("decoder".into()),
            JobError::Dispatch("403".into()),
        ];
        for err in all {
            assert!(err.user_message().starts_with("⚠️"));
        }
    }

    #[test]
    fn missing_config_lists_candidates() {
        let err = ConfigError::Missing(&["TOKEN", "DISCORD_TOKEN"]);
        assert_eq!(
            err.to_string(),
            "missing environment variable: set one of TOKEN, DISCORD_TOKEN"
        );
    }
}
