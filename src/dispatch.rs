use std::collections::HashMap;

use anyhow::Result;
use futures::future::BoxFuture;
use tracing::debug;

use crate::bot::{self, BotContext};
use crate::platform::webhook::{Event, MessageContent, WebhookPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Text,
    Mention,
    Sticker,
    Image,
    Unsend,
}

impl EventKind {
    /// The handler bucket for an event, or `None` for events the bot ignores.
    pub fn classify(event: &Event) -> Option<Self> {
        match event {
            Event::Message(ev) => match &ev.message {
                MessageContent::Text(text) if text.mentions_self() => Some(EventKind::Mention),
                MessageContent::Text(_) => Some(EventKind::Text),
                MessageContent::Sticker(_) => Some(EventKind::Sticker),
                MessageContent::Image(_) => Some(EventKind::Image),
                MessageContent::Other => None,
            },
            Event::Unsend(_) => Some(EventKind::Unsend),
            Event::Other => None,
        }
    }
}

pub type Handler = for<'a> fn(&'a BotContext, &'a Event) -> BoxFuture<'a, Result<()>>;

/// Routes each webhook event to exactly one handler.
pub struct Dispatcher {
    handlers: HashMap<EventKind, Handler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut handlers: HashMap<EventKind, Handler> = HashMap::new();
        handlers.insert(EventKind::Text, bot::handle_text);
        handlers.insert(EventKind::Mention, bot::handle_mention);
        handlers.insert(EventKind::Sticker, bot::handle_sticker);
        handlers.insert(EventKind::Image, bot::handle_image);
        handlers.insert(EventKind::Unsend, bot::handle_unsend);
        Self { handlers }
    }

    /// Run every event in order. Returns how many events were handled; the
    /// first handler error stops the batch.
    pub async fn dispatch(&self, ctx: &BotContext, payload: &WebhookPayload) -> Result<usize> {
        let mut handled = 0;
        for event in &payload.events {
            let Some(handler) = EventKind::classify(event).and_then(|kind| {
                debug!("Dispatching {:?} event", kind);
                self.handlers.get(&kind)
            }) else {
                debug!("Ignoring unhandled event");
                continue;
            };

            handler(ctx, event).await?;
            handled += 1;
        }
        Ok(handled)
    }
}
