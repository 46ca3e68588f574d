//! Local, advisory expiry check for bearer and refresh tokens.
//!
//! Signatures are never verified here; the R2R service stays the authority on
//! token validity. The check only saves a round trip when a token has clearly
//! expired.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::error::{R2rError, Result};

/// Decode the payload of a JWT without signature verification.
pub fn decode_claims(token: &str) -> Result<Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(R2rError::Token(format!(
            "expected 3 parts, got {}",
            parts.len()
        )));
    }

    // some issuers pad the segments anyway
    let payload = parts[1].trim_end_matches('=');
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| R2rError::Token(format!("payload base64 decode: {e}")))?;

    let claims: Value = serde_json::from_slice(&payload_bytes)
        .map_err(|e| R2rError::Token(format!("payload JSON parse: {e}")))?;
    if !claims.is_object() {
        return Err(R2rError::Token("payload is not a JSON object".into()));
    }
    Ok(claims)
}

/// The `exp` claim as a Unix timestamp in (possibly fractional) seconds.
pub fn expires_at(token: &str) -> Option<f64> {
    let claims = match decode_claims(token) {
        Ok(c) => c,
        Err(e) => {
            debug!("token not decodable: {e}");
            return None;
        }
    };
    claims.get("exp")?.as_f64()
}

pub fn is_token_valid_at(token: &str, now: f64) -> bool {
    if token.is_empty() {
        return false;
    }
    matches!(expires_at(token), Some(exp) if exp > now)
}

pub fn is_token_valid(token: &str) -> bool {
    let now = Utc::now().timestamp_millis() as f64 / 1000.0;
    is_token_valid_at(token, now)
}

#[cfg(test)]
pub(crate) fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
