use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bot::BotContext;
use crate::dispatch::Dispatcher;
use crate::platform::signature::{self, WebhookError, SIGNATURE_HEADER};
use crate::platform::webhook::WebhookPayload;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<BotContext>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(bot: BotContext) -> Self {
        Self {
            bot: Arc::new(bot),
            dispatcher: Arc::new(Dispatcher::new()),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        warn!("Rejected webhook: {}", self);
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Anything that went wrong after the request was accepted.
pub struct AppError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error handling webhook: {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/callback", post(callback))
        .route("/get", get(echo))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run(state: AppState, address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!("Listening on {}", address);

    axum::serve(listener, router(state))
        .await
        .context("Webhook server stopped")?;
    Ok(())
}

async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, Response> {
    let line_signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    debug!("Request body: {}", String::from_utf8_lossy(&body));

    signature::verify(&state.bot.config.line.channel_secret, &body, line_signature)
        .map_err(IntoResponse::into_response)?;

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::MalformedBody(e.to_string()).into_response())?;

    let handled = state
        .dispatcher
        .dispatch(&state.bot, &payload)
        .await
        .map_err(|e| AppError::from(e).into_response())?;

    debug!(
        "Handled {} of {} event(s) for {}",
        handled,
        payload.events.len(),
        payload.destination.as_deref().unwrap_or("-")
    );
    Ok("OK")
}

#[derive(Debug, Serialize)]
struct EchoResponse {
    message: &'static str,
    param1: String,
}

/// Diagnostic probe that echoes `param1` back.
async fn echo(Query(params): Query<HashMap<String, String>>) -> Json<EchoResponse> {
    let param1 = params
        .get("param1")
        .cloned()
        .unwrap_or_else(|| "default_value".to_string());

    Json(EchoResponse {
        message: "GET method received!",
        param1,
    })
}
