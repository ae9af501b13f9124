use std::sync::Arc;

use serenity::{
    all::{ChannelId, CreateAllowedMentions, CreateMessage, Http, RoleId},
    async_trait,
};

use crate::error::NotifyError;

/// A message for the requester's text channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub content: String,
    /// The only role allowed to be pinged. `None` pings nobody.
    pub mention_role: Option<RoleId>,
}

impl Notice {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            mention_role: None,
        }
    }

    pub fn times_up(role: Option<RoleId>) -> Self {
        match role {
            Some(role) => Self {
                content: format!("⏰ Time's up! <@&{role}>"),
                mention_role: Some(role),
            },
            None => Self::plain("⏰ Time's up!"),
        }
    }

    fn allowed_mentions(&self) -> CreateAllowedMentions {
        match self.mention_role {
            Some(role) => CreateAllowedMentions::new().roles(vec![role]),
            None => CreateAllowedMentions::new(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel_id: ChannelId, notice: Notice) -> Result<(), NotifyError>;
}

pub struct ChannelNotifier {
    http: Arc<Http>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, channel_id: ChannelId, notice: Notice) -> Result<(), NotifyError> {
        let message = CreateMessage::new()
            .content(&notice.content)
            .allowed_mentions(notice.allowed_mentions());
        channel_id
            .send_message(&self.http, message)
            .await
            .map(|_| ())
            .map_err(|e| NotifyError(e.to_string()))
    }
}
