use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::config::Config;
use crate::filter::KeywordFilter;
use crate::platform::webhook::{
    Event, ImageContent, MessageContent, MessageEvent, StickerContent, TextContent,
};
use crate::platform::{Messenger, OutgoingMessage};
use crate::store::MessageWindow;

const UNKNOWN_SENDER: &str = "unknown";

/// Everything a handler needs, built once at startup.
pub struct BotContext {
    pub config: Config,
    pub messenger: Arc<dyn Messenger>,
    pub window: Arc<dyn MessageWindow>,
    pub filter: KeywordFilter,
}

impl BotContext {
    pub fn new(
        config: Config,
        messenger: Arc<dyn Messenger>,
        window: Arc<dyn MessageWindow>,
    ) -> Result<Self> {
        let filter = KeywordFilter::new(&config.bot.keyword)?;
        Ok(Self {
            config,
            messenger,
            window,
            filter,
        })
    }
}

fn text_message(event: &Event) -> Option<(&MessageEvent, &TextContent)> {
    match event {
        Event::Message(ev) => match &ev.message {
            MessageContent::Text(text) => Some((ev, text)),
            _ => None,
        },
        _ => None,
    }
}

fn sticker_message(event: &Event) -> Option<(&MessageEvent, &StickerContent)> {
    match event {
        Event::Message(ev) => match &ev.message {
            MessageContent::Sticker(sticker) => Some((ev, sticker)),
            _ => None,
        },
        _ => None,
    }
}

fn image_message(event: &Event) -> Option<(&MessageEvent, &ImageContent)> {
    match event {
        Event::Message(ev) => match &ev.message {
            MessageContent::Image(image) => Some((ev, image)),
            _ => None,
        },
        _ => None,
    }
}

/// Warn about the keyword, or remember the message for unsend lookups.
pub fn handle_text<'a>(ctx: &'a BotContext, event: &'a Event) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let Some((msg, text)) = text_message(event) else {
            return Ok(());
        };

        if ctx.filter.is_match(&text.text) {
            info!(
                "Keyword {:?} found in message {}, sending warning",
                ctx.filter.keyword(),
                text.id
            );
            ctx.messenger
                .reply(
                    &msg.reply_token,
                    vec![OutgoingMessage::text(&ctx.config.bot.warning_text)],
                    true,
                )
                .await?;
            return Ok(());
        }

        let sender = msg.source.user_id.as_deref().unwrap_or(UNKNOWN_SENDER);
        ctx.window
            .record(sender, &text.id, &text.text)
            .await
            .with_context(|| format!("Failed to record message {}", text.id))?;
        debug!("Recorded message {} from {}", text.id, sender);
        Ok(())
    })
}

/// The bot itself was tagged in a text message.
pub fn handle_mention<'a>(ctx: &'a BotContext, event: &'a Event) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let Some((msg, text)) = text_message(event) else {
            return Ok(());
        };

        let reply = &ctx.config.bot.mention_reply;
        if reply.is_empty() {
            debug!("Mentioned in message {}, no mention reply configured", text.id);
            return Ok(());
        }

        info!("Mentioned in message {}, replying", text.id);
        ctx.messenger
            .reply(&msg.reply_token, vec![OutgoingMessage::text(reply)], true)
            .await
    })
}

/// Answer any sticker with the configured sticker.
pub fn handle_sticker<'a>(ctx: &'a BotContext, event: &'a Event) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let Some((msg, sticker)) = sticker_message(event) else {
            return Ok(());
        };

        info!(
            "Sticker {}/{} received, replying",
            sticker.package_id, sticker.sticker_id
        );
        let bot = &ctx.config.bot;
        ctx.messenger
            .reply(
                &msg.reply_token,
                vec![OutgoingMessage::sticker(&bot.sticker_package_id, &bot.sticker_id)],
                true,
            )
            .await
    })
}

pub fn handle_image<'a>(_ctx: &'a BotContext, event: &'a Event) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if let Some((msg, image)) = image_message(event) {
            info!(
                "Image {} received from {}",
                image.id,
                msg.source.user_id.as_deref().unwrap_or(UNKNOWN_SENDER)
            );
        }
        Ok(())
    })
}

/// Repost the text of a retracted message, if it is still in the window.
pub fn handle_unsend<'a>(ctx: &'a BotContext, event: &'a Event) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let Event::Unsend(unsend) = event else {
            return Ok(());
        };
        let message_id = &unsend.unsend.message_id;

        let Some(stored) = ctx.window.find_by_message_id(message_id).await? else {
            debug!("Unsent message {} is not in the window", message_id);
            return Ok(());
        };
        let Some(target) = unsend.source.conversation_id() else {
            debug!("Unsend event for {} has no conversation to post to", message_id);
            return Ok(());
        };

        info!(
            "Message {} from {} was unsent, reposting to {:?} {}",
            message_id, stored.sender_id, unsend.source.kind, target
        );
        ctx.messenger
            .push(target, vec![OutgoingMessage::text(recall_text(&stored.text))])
            .await
    })
}

pub fn recall_text(text: &str) -> String {
    format!("你是不是想要說：「{}」", text)
}
