//! Message window kept in a Firebase Realtime Database tree, via the REST API.
//!
//! Entries live under `{database_url}/{path}` keyed by server-generated push
//! ids, which sort in insertion order. Counting, pushing and evicting are
//! separate requests with no transaction around them, so two webhooks racing
//! each other can briefly leave more than `capacity` entries behind. The next
//! `record` trims the tree back down to `capacity`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{next_order, MessageWindow, StoredMessage};
use crate::google::TokenSource;

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

pub struct FirebaseWindow {
    client: reqwest::Client,
    database_url: String,
    path: String,
    capacity: usize,
    auth: Arc<dyn TokenSource>,
}

impl FirebaseWindow {
    pub fn new(
        client: reqwest::Client,
        database_url: &str,
        path: &str,
        capacity: usize,
        auth: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            database_url: database_url.trim_end_matches('/').to_string(),
            path: path.trim_matches('/').to_string(),
            capacity,
            auth,
        }
    }

    fn url(&self, child: Option<&str>) -> String {
        match child {
            Some(key) => format!("{}/{}/{}.json", self.database_url, self.path, key),
            None => format!("{}/{}.json", self.database_url, self.path),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to {} in Firebase", what))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Firebase error while trying to {} ({}): {}", what, status, error_body);
        }
        Ok(response)
    }

    /// All children keyed by push id, unparsed. An absent node reads as `null`.
    async fn read_all(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        let response = self
            .send(self.client.get(self.url(None)), "read messages")
            .await?;
        let children: Option<BTreeMap<String, serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse Firebase messages")?;
        Ok(children.unwrap_or_default())
    }

    async fn push(&self, message: &StoredMessage) -> Result<String> {
        let response = self
            .send(self.client.post(self.url(None)).json(message), "push message")
            .await?;
        let pushed: PushResponse = response
            .json()
            .await
            .context("Failed to parse Firebase push response")?;
        Ok(pushed.name)
    }

    async fn oldest_keys(&self, limit: usize) -> Result<Vec<String>> {
        let request = self.client.get(self.url(None)).query(&[
            ("orderBy", "\"$key\"".to_string()),
            ("limitToFirst", limit.to_string()),
        ]);
        let response = self.send(request, "query oldest messages").await?;
        let oldest: Option<BTreeMap<String, serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse Firebase query response")?;
        Ok(oldest
            .map(|children| children.into_keys().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.send(self.client.delete(self.url(Some(key))), "delete message")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageWindow for FirebaseWindow {
    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn record(&self, sender_id: &str, message_id: &str, text: &str) -> Result<()> {
        let current = self.read_all().await?;
        let message = StoredMessage {
            order: next_order(&parse_children(&current)),
            sender_id: sender_id.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
        };

        let key = self.push(&message).await?;
        debug!("Pushed message {} as {}", message_id, key);

        // Children that fail to parse still occupy a slot and age out like the rest.
        let overflow = (current.len() + 1).saturating_sub(self.capacity);
        if overflow > 0 {
            for oldest in self.oldest_keys(overflow).await? {
                self.delete(&oldest).await?;
                debug!("Evicted oldest message {}", oldest);
            }
        }
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<StoredMessage>> {
        Ok(parse_children(&self.read_all().await?))
    }
}

/// Convert raw children in key order, skipping any that don't look like a message.
fn parse_children(children: &BTreeMap<String, serde_json::Value>) -> Vec<StoredMessage> {
    children
        .iter()
        .filter_map(|(key, value)| match StoredMessage::deserialize(value) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Skipping malformed Firebase entry {}: {}", key, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::StaticToken;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn window_for(server: &MockServer, capacity: usize) -> FirebaseWindow {
        FirebaseWindow::new(
            reqwest::Client::new(),
            &format!("{}/", server.uri()),
            "messages",
            capacity,
            Arc::new(StaticToken("fb-token".into())),
        )
    }

    fn entry(order: i64, id: &str) -> serde_json::Value {
        serde_json::json!({
            "order": order,
            "user_id": "U1",
            "message_id": id,
            "message_text": format!("text {}", id)
        })
    }

    #[tokio::test]
    async fn test_empty_tree_reads_as_empty_window() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/messages.json"))
            .and(header("authorization", "Bearer fb-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let window = window_for(&server, 5);
        assert!(window.entries().await.unwrap().is_empty());
        assert_eq!(window.find_by_message_id("m1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_below_capacity_only_pushes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/messages.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "-A1": entry(0, "m1")
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages.json"))
            .and(body_json(serde_json::json!({
                "order": 1,
                "user_id": "U2",
                "message_id": "m2",
                "message_text": "hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "-A2"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        window_for(&server, 5)
            .record("U2", "m2", "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_record_at_capacity_evicts_oldest_key() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/messages.json"))
            .and(query_param("orderBy", "\"$key\""))
            .and(query_param("limitToFirst", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "-A1": entry(0, "m1")
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/messages.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "-A1": entry(0, "m1"),
                "-A2": entry(1, "m2"),
                "-A3": entry(2, "m3"),
                "-A4": entry(3, "m4"),
                "-A5": entry(4, "m5")
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages.json"))
            .and(body_json(serde_json::json!({
                "order": 5,
                "user_id": "U1",
                "message_id": "m6",
                "message_text": "hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "-A6"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/messages/-A1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .expect(1)
            .mount(&server)
            .await;

        window_for(&server, 5)
            .record("U1", "m6", "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_scans_children() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/messages.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "-A1": entry(0, "m1"),
                "-A2": entry(1, "m2")
            })))
            .mount(&server)
            .await;

        let window = window_for(&server, 5);
        let found = window.find_by_message_id("m2").await.unwrap().unwrap();
        assert_eq!(found.text, "text m2");
        assert_eq!(window.find_by_message_id("m9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_over_capacity_trims_back_down() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/messages.json"))
            .and(query_param("orderBy", "\"$key\""))
            .and(query_param("limitToFirst", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "-A1": entry(0, "m1"),
                "-A2": entry(1, "m2")
            })))
            .expect(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/messages.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "-A1": entry(0, "m1"),
                "-A2": entry(1, "m2"),
                "-A3": entry(2, "m3"),
                "-A4": entry(3, "m4"),
                "-A5": entry(4, "m5"),
                "-A6": entry(5, "m6")
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "-A7"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/messages/-A1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/messages/-A2.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .expect(1)
            .mount(&server)
            .await;

        window_for(&server, 5)
            .record("U1", "m7", "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_children_are_skipped() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/messages.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "-A0": "seed",
                "-A1": {"order": 0, "message_id": "m1", "message_text": "no sender"},
                "-A2": entry(1, "m2")
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages.json"))
            .and(body_json(serde_json::json!({
                "order": 2,
                "user_id": "U3",
                "message_id": "m3",
                "message_text": "hi"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "-A3"})))
            .expect(1)
            .mount(&server)
            .await;

        let window = window_for(&server, 5);
        let found = window.find_by_message_id("m2").await.unwrap().unwrap();
        assert_eq!(found.text, "text m2");

        let legacy = window.find_by_message_id("m1").await.unwrap().unwrap();
        assert_eq!(legacy.sender_id, "");
        assert_eq!(legacy.text, "no sender");

        assert_eq!(window.entries().await.unwrap().len(), 2);
        window.record("U3", "m3", "hi").await.unwrap();
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/messages.json"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Permission denied"))
            .mount(&server)
            .await;

        let err = window_for(&server, 5)
            .record("U1", "m1", "hi")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
