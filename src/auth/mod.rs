//! Authentication against the dashboard backend
//!
//! - [`AuthClient`]: the auth endpoint seam (login, register, logout, refresh)
//! - [`HttpAuthClient`]: JSON over HTTP (`POST /auth/login`, ...)
//! - [`AuthMode`]: whether endpoint failures fall back to an offline identity
//! - [`DevToken`]: signed tokens issued by the development server

mod http;
mod tokens;

pub use http::HttpAuthClient;
pub use tokens::{DevToken, TokenError, DEV_TOKEN_PREFIX};

use crate::session::{Role, User};
use crate::storage::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("auth endpoint unreachable: {0}")]
    NetworkUnavailable(String),

    #[error("auth endpoint rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("invalid auth response: {0}")]
    InvalidResponse(String),

    #[error("token storage error: {0}")]
    Storage(#[from] StorageError),
}

/// How the session store treats auth endpoint failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Any failure yields an offline identity and a placeholder token
    #[default]
    Demo,
    /// Failures are returned to the caller
    Strict,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Demo => write!(f, "demo"),
            AuthMode::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "demo" => Ok(AuthMode::Demo),
            "strict" => Ok(AuthMode::Strict),
            _ => Err(format!("Invalid auth mode: '{}'. Must be: demo or strict", s)),
        }
    }
}

/// Body of `POST /auth/login`
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Body of `POST /auth/register`
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .field("role", &self.role)
            .finish()
    }
}

/// Successful response of login and register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// The authentication endpoint
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, AuthError>;

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, AuthError>;

    /// Tell the backend the token is no longer in use
    async fn logout(&self, token: &str) -> Result<(), AuthError>;

    /// Exchange a still-valid token for a fresh one
    async fn refresh(&self, token: &str) -> Result<AuthResponse, AuthError>;
}
