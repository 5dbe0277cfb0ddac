// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Capability tokens: HMAC-signed, canonical-JSON claims binding an
//! approval to `(client_id, tool_id[, context_key])` with an expiry.
//!
//! Wire form: `base64url_nopad(canonical_payload_json).hex(hmac_sha256(secret, base64_bytes))`.
//! See SPEC_FULL.md §11.6 for why the url-safe, unpadded variant was chosen
//! over the looser `base64(...)` phrasing elsewhere in the spec.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: expected exactly one '.'")]
    Malformed,
    #[error("invalid base64 payload")]
    InvalidBase64,
    #[error("invalid hex signature")]
    InvalidHex,
    #[error("payload is not valid JSON")]
    InvalidJson,
    #[error("HMAC key rejected — must not be empty")]
    InvalidKey,
}

/// The canonical payload. Field order here is irrelevant — canonicalization
/// happens at serialization time via `canonical_json`, not via struct
/// field order, which serde does not guarantee is preserved on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub client_id: String,
    pub tool_id: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_key: Option<String>,
}

/// Serializes with sorted keys and no whitespace, matching the spec's
/// `(",", ":")` separator canonicalization. `serde_json::Value` sorts map
/// keys (it stores them in a `BTreeMap` unless the `preserve_order`
/// feature is enabled, which this workspace does not enable).
fn canonical_json(payload: &TokenPayload) -> Result<String, TokenError> {
    let value = serde_json::to_value(payload).map_err(|_| TokenError::InvalidJson)?;
    serde_json::to_string(&value).map_err(|_| TokenError::InvalidJson)
}

fn sign(secret: &[u8], base64_payload: &str) -> Result<String, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
    mac.update(base64_payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn generate(
    client_id: &str,
    tool_id: &str,
    ttl_seconds: i64,
    secret: &[u8],
    context_key: Option<&str>,
) -> Result<String, TokenError> {
    let now = chrono::Utc::now().timestamp();
    let payload = TokenPayload {
        client_id: client_id.to_string(),
        tool_id: tool_id.to_string(),
        iat: now,
        exp: now + ttl_seconds,
        context_key: context_key.map(|s| s.to_string()),
    };
    let canonical = canonical_json(&payload)?;
    let b64 = URL_SAFE_NO_PAD.encode(canonical.as_bytes());
    let sig = sign(secret, &b64)?;
    Ok(format!("{b64}.{sig}"))
}

/// Parses the wire form without verifying — for logging/diagnostics only.
/// Never trust the result of `decode` for an authorization decision.
pub fn decode(token: &str) -> Result<TokenPayload, TokenError> {
    let (b64, _sig) = split_token(token)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(b64)
        .map_err(|_| TokenError::InvalidBase64)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::InvalidJson)
}

fn split_token(token: &str) -> Result<(&str, &str), TokenError> {
    let mut parts = token.splitn(2, '.');
    let b64 = parts.next().ok_or(TokenError::Malformed)?;
    let sig = parts.next().ok_or(TokenError::Malformed)?;
    if token.matches('.').count() != 1 {
        return Err(TokenError::Malformed);
    }
    Ok((b64, sig))
}

/// Implements the §4.3 validation order, short-circuiting on first
/// failure: well-formed → HMAC match (constant-time) → not expired →
/// client_id matches → tool_id matches → context_key matches if supplied.
pub fn verify(
    token: &str,
    expected_client_id: &str,
    expected_tool_id: &str,
    secret: &[u8],
    expected_context_key: Option<&str>,
) -> bool {
    verify_inner(
        token,
        expected_client_id,
        expected_tool_id,
        secret,
        expected_context_key,
    )
    .unwrap_or(false)
}

fn verify_inner(
    token: &str,
    expected_client_id: &str,
    expected_tool_id: &str,
    secret: &[u8],
    expected_context_key: Option<&str>,
) -> Result<bool, TokenError> {
    let (b64, sig_hex) = split_token(token)?;

    let expected_sig = sign(secret, b64)?;
    let provided = hex::decode(sig_hex).map_err(|_| TokenError::InvalidHex)?;
    let expected = hex::decode(&expected_sig).map_err(|_| TokenError::InvalidHex)?;
    if provided.len() != expected.len() || provided.ct_eq(&expected).unwrap_u8() != 1 {
        return Ok(false);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(b64)
        .map_err(|_| TokenError::InvalidBase64)?;
    let payload: TokenPayload =
        serde_json::from_slice(&bytes).map_err(|_| TokenError::InvalidJson)?;

    if payload.exp <= chrono::Utc::now().timestamp() {
        return Ok(false);
    }
    if payload.client_id != expected_client_id {
        return Ok(false);
    }
    if payload.tool_id != expected_tool_id {
        return Ok(false);
    }
    if let Some(ctx) = expected_context_key {
        if payload.context_key.as_deref() != Some(ctx) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-at-least-32-bytes-long!";

    #[test]
    fn generate_then_verify_round_trips() {
        let token = generate("client-1", "write_file", 300, SECRET, None).unwrap();
        assert!(verify(&token, "client-1", "write_file", SECRET, None));
    }

    #[test]
    fn wrong_secret_fails() {
        let token = generate("client-1", "write_file", 300, SECRET, None).unwrap();
        assert!(!verify(&token, "client-1", "write_file", b"a-different-secret-entirely!!!!!", None));
    }

    #[test]
    fn wrong_client_id_fails() {
        let token = generate("client-1", "write_file", 300, SECRET, None).unwrap();
        assert!(!verify(&token, "client-2", "write_file", SECRET, None));
    }

    #[test]
    fn wrong_tool_id_fails() {
        let token = generate("client-1", "write_file", 300, SECRET, None).unwrap();
        assert!(!verify(&token, "client-1", "delete_file", SECRET, None));
    }

    #[test]
    fn context_key_mismatch_fails() {
        let token = generate("client-1", "move_file", 300, SECRET, Some("/a/b")).unwrap();
        assert!(!verify(&token, "client-1", "move_file", SECRET, Some("/a/c")));
        assert!(verify(&token, "client-1", "move_file", SECRET, Some("/a/b")));
    }

    #[test]
    fn expired_token_fails() {
        let token = generate("client-1", "write_file", -1, SECRET, None).unwrap();
        assert!(!verify(&token, "client-1", "write_file", SECRET, None));
    }

    #[test]
    fn single_byte_mutation_fails() {
        let mut token = generate("client-1", "write_file", 300, SECRET, None).unwrap();
        let last = token.pop().unwrap();
        let mutated = if last == '0' { '1' } else { '0' };
        token.push(mutated);
        assert!(!verify(&token, "client-1", "write_file", SECRET, None));
    }

    #[test]
    fn malformed_token_is_rejected_not_panicking() {
        assert!(!verify("not-a-token", "client-1", "write_file", SECRET, None));
        assert!(!verify("a.b.c", "client-1", "write_file", SECRET, None));
    }
}
