use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{Messenger, OutgoingMessage};
use crate::config::LineConfig;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<OutgoingMessage>,
    notification_disabled: bool,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<OutgoingMessage>,
}

/// Client for the LINE Messaging API
pub struct LineClient {
    client: reqwest::Client,
    config: LineConfig,
}

impl LineClient {
    /// `client` is the shared HTTP client; its timeout comes from `line.timeout_secs`.
    pub fn new(config: LineConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    async fn post<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<()> {
        let url = format!(
            "{}/v2/bot/message/{}",
            self.config.api_base_url.trim_end_matches('/'),
            endpoint
        );

        debug!("Sending request to LINE: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.channel_access_token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to LINE", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("LINE API error ({}): {}", status, error_body);
        }

        Ok(())
    }
}

#[async_trait]
impl Messenger for LineClient {
    async fn reply(
        &self,
        reply_token: &str,
        messages: Vec<OutgoingMessage>,
        notification_disabled: bool,
    ) -> Result<()> {
        self.post(
            "reply",
            &ReplyRequest {
                reply_token,
                messages,
                notification_disabled,
            },
        )
        .await
    }

    async fn push(&self, to: &str, messages: Vec<OutgoingMessage>) -> Result<()> {
        self.post("push", &PushRequest { to, messages }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> LineClient {
        LineClient::new(
            LineConfig {
                channel_access_token: "token-123".into(),
                channel_secret: "secret".into(),
                api_base_url: server.uri(),
                timeout_secs: 5,
            },
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn test_reply_sends_sticker_with_notification_disabled() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .and(header("authorization", "Bearer token-123"))
            .and(body_json(serde_json::json!({
                "replyToken": "rt-1",
                "messages": [{"type": "sticker", "packageId": "8515", "stickerId": "16581242"}],
                "notificationDisabled": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .reply(
                "rt-1",
                vec![OutgoingMessage::sticker("8515", "16581242")],
                true,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_sends_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/push"))
            .and(body_json(serde_json::json!({
                "to": "G1",
                "messages": [{"type": "text", "text": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .push("G1", vec![OutgoingMessage::text("hi")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/push"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .push("G1", vec![OutgoingMessage::text("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("quota exceeded"));
    }
}
