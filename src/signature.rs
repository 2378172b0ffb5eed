//! Signed URL verification
//!
//! A signature is a two-level envelope:
//!
//! ```text
//! outer = base64(JSON({"data": D, "signature": S}))
//! D     = base64(JSON({"itemId": .., "mediaId": .., "expireAt": <unix secs>}))
//! S     = base64(HMAC-SHA256(decoded D, secret))
//! ```
//!
//! Verification is a pure function of the envelope, the secret and the clock.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature")]
    MalformedSignature,

    #[error("signature mismatch")]
    TamperedSignature,

    #[error("signature expired")]
    ExpiredSignature,

    #[error("malformed payload")]
    MalformedPayload,

    #[error("unusable signing key")]
    InvalidKey,
}

/// Claims carried inside a signed URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub item_id: String,
    pub media_id: String,
    /// Unix timestamp (seconds, UTC) after which the signature is rejected
    pub expire_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    data: String,
    signature: String,
}

/// Verify a signature against the current UTC time.
pub fn verify(signature: &str, secret: &str) -> Result<Claims, SignatureError> {
    verify_at(signature, secret, chrono::Utc::now().timestamp())
}

/// Verify a signature as of `now` (unix seconds).
pub fn verify_at(signature: &str, secret: &str, now: i64) -> Result<Claims, SignatureError> {
    let envelope_json = STANDARD
        .decode(signature)
        .map_err(|_| SignatureError::MalformedSignature)?;

    let envelope: Envelope =
        serde_json::from_slice(&envelope_json).map_err(|_| SignatureError::MalformedSignature)?;

    let data = STANDARD
        .decode(&envelope.data)
        .map_err(|_| SignatureError::MalformedSignature)?;
    let expected = STANDARD
        .decode(&envelope.signature)
        .map_err(|_| SignatureError::MalformedSignature)?;

    // verify_slice compares in constant time
    let mut mac = keyed_mac(secret)?;
    mac.update(&data);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::TamperedSignature)?;

    let claims: Claims =
        serde_json::from_slice(&data).map_err(|_| SignatureError::MalformedPayload)?;

    if now > claims.expire_at {
        return Err(SignatureError::ExpiredSignature);
    }

    Ok(claims)
}

/// Build a signature envelope for `claims`.
pub fn sign(claims: &Claims, secret: &str) -> Result<String, SignatureError> {
    let payload = serde_json::to_vec(claims).map_err(|_| SignatureError::MalformedPayload)?;
    sign_payload(&payload, secret)
}

fn sign_payload(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac = keyed_mac(secret)?;
    mac.update(payload);
    let tag = mac.finalize().into_bytes();

    let envelope = Envelope {
        data: STANDARD.encode(payload),
        signature: STANDARD.encode(tag),
    };
    let envelope_json =
        serde_json::to_vec(&envelope).map_err(|_| SignatureError::MalformedSignature)?;
    Ok(STANDARD.encode(envelope_json))
}

fn keyed_mac(secret: &str) -> Result<HmacSha256, SignatureError> {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => Ok(mac),
        Err(_) => Err(SignatureError::InvalidKey),
    }
}
