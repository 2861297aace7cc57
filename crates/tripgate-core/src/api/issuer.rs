use async_trait::async_trait;
use serde_json::Value;

use super::ApiError;

/// Issuing-service operations that hand out a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    Register,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Login => "/auth/login",
            Endpoint::Register => "/auth/register",
        }
    }
}

/// What the issuing service answered.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuerReply {
    pub status: u16,
    /// Parsed JSON body; `Null` when an error response had no usable body
    pub body: Value,
}

impl IssuerReply {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The issued token, if the body carries a non-empty `token` string.
    pub fn token(&self) -> Option<&str> {
        self.body
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
    }

    /// The server's user-facing `message`, if any.
    pub fn message(&self) -> Option<&str> {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
    }
}

/// Exchanges credentials for a token.
///
/// Implementations return `Ok` for any HTTP answer, including error
/// statuses, and `Err` only when no usable answer arrived.
#[async_trait]
pub trait Issuer: Send + Sync {
    async fn exchange(&self, endpoint: Endpoint, body: Value) -> Result<IssuerReply, ApiError>;
}
