//! HTTP client for the credential-issuing service and the application.
//!
//! The issuing service exchanges email/password for a signed token at
//! `POST /auth/login` and `POST /auth/register`. `Issuer` is the seam the
//! session talks to; `ApiClient` is the reqwest implementation.

pub mod client;
pub mod error;
pub mod issuer;

pub use client::ApiClient;
pub use error::ApiError;
pub use issuer::{Endpoint, Issuer, IssuerReply};
