use thiserror::Error;

use crate::token::TokenError;

/// Everything that can go wrong while establishing a session.
/// None of these are fatal; the session turns them into a message.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    MalformedToken(#[from] TokenError),

    /// Non-2xx from the issuing service, with its message
    #[error("{0}")]
    IssuingService(String),

    #[error("{0}")]
    Network(String),

    #[error("No token received")]
    MissingTokenInResponse,

    #[error("Failed to save session: {0}")]
    Storage(String),
}
