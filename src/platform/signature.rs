use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Reasons a webhook request is rejected before any handler runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing X-Line-Signature header")]
    MissingSignature,
    #[error("invalid signature, check the channel secret")]
    InvalidSignature,
    #[error("malformed webhook body: {0}")]
    MalformedBody(String),
}

/// Base64 HMAC-SHA256 of `body` keyed by the channel secret.
#[cfg(test)]
pub(crate) fn sign(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes()).unwrap();
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Check the `X-Line-Signature` value against the raw request body.
pub fn verify(
    channel_secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), WebhookError> {
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    let expected = BASE64
        .decode(signature.trim())
        .map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}
