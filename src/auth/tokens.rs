//! Signed session tokens issued by the development server
//!
//! Format: `dev-<payload>.<signature>` where the payload is base64url JSON
//! and the signature is a truncated HMAC-SHA256 over the encoded payload.

use crate::session::Role;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

pub const DEV_TOKEN_PREFIX: &str = "dev-";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    InvalidFormat,

    #[error("invalid token prefix: expected '{expected}', got '{got}'")]
    InvalidPrefix { expected: String, got: String },

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("invalid signing key")]
    InvalidKey,

    #[error("token decode error: {0}")]
    DecodeError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevTokenPayload {
    pub user_id: String,
    pub role: Role,
    /// Epoch millis
    pub issued_at: i64,
}

/// A verified development token
#[derive(Debug, Clone)]
pub struct DevToken {
    token: String,
    payload: DevTokenPayload,
}

fn sign(payload_b64: &str, secret: &[u8]) -> Result<String, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    Ok(URL_SAFE_NO_PAD.encode(&signature[..16]))
}

impl DevToken {
    pub fn create(
        user_id: impl Into<String>,
        role: Role,
        secret: &[u8],
    ) -> Result<Self, TokenError> {
        let payload = DevTokenPayload {
            user_id: user_id.into(),
            role,
            issued_at: Utc::now().timestamp_millis(),
        };
        let payload_json =
            serde_json::to_vec(&payload).map_err(|e| TokenError::DecodeError(e.to_string()))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);
        let signature_b64 = sign(&payload_b64, secret)?;

        let token = format!("{}{}.{}", DEV_TOKEN_PREFIX, payload_b64, signature_b64);
        Ok(Self { token, payload })
    }

    /// Parse and verify a token
    pub fn parse(token: &str, secret: &[u8]) -> Result<Self, TokenError> {
        let content = token
            .strip_prefix(DEV_TOKEN_PREFIX)
            .ok_or_else(|| TokenError::InvalidPrefix {
                expected: DEV_TOKEN_PREFIX.to_string(),
                got: token.chars().take(DEV_TOKEN_PREFIX.len()).collect(),
            })?;

        let (payload_b64, signature_b64) =
            content.split_once('.').ok_or(TokenError::InvalidFormat)?;
        if signature_b64.contains('.') {
            return Err(TokenError::InvalidFormat);
        }

        if sign(payload_b64, secret)? != signature_b64 {
            return Err(TokenError::InvalidSignature);
        }

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;
        let payload: DevTokenPayload = serde_json::from_slice(&payload_json)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;

        Ok(Self {
            token: token.to_string(),
            payload,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn user_id(&self) -> &str {
        &self.payload.user_id
    }

    pub fn role(&self) -> Role {
        self.payload.role
    }

    pub fn issued_at(&self) -> i64 {
        self.payload.issued_at
    }
}

impl fmt::Display for DevToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)
    }
}
