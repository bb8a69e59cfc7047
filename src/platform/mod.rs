pub mod line;
pub mod signature;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A message the bot sends back to LINE
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingMessage {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Sticker {
        package_id: String,
        sticker_id: String,
    },
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutgoingMessage::Text { text: text.into() }
    }

    pub fn sticker(package_id: impl Into<String>, sticker_id: impl Into<String>) -> Self {
        OutgoingMessage::Sticker {
            package_id: package_id.into(),
            sticker_id: sticker_id.into(),
        }
    }
}

/// Outbound side of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Answer an event using its one-time reply token.
    async fn reply(
        &self,
        reply_token: &str,
        messages: Vec<OutgoingMessage>,
        notification_disabled: bool,
    ) -> Result<()>;

    /// Send to a conversation by its persistent group/room/user id.
    async fn push(&self, to: &str, messages: Vec<OutgoingMessage>) -> Result<()>;
}
