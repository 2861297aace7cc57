//! Session management for the tripgate web application.
//!
//! The session is a signed bearer token issued by an external service in
//! exchange for email/password. This crate decodes its claims, keeps it in
//! a durable store and an HTTP-visible cookie, derives the signed-in user
//! from it, and decides per request whether protected paths may be served.

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod store;
pub mod token;

pub use api::{ApiClient, ApiError, Endpoint, Issuer, IssuerReply};
pub use auth::{AuthError, NavigationLog, Navigator, RegisterPayload, Session, SessionConfig, SessionState};
pub use config::{Config, StorageBackend};
pub use guard::{AccessGuard, Decision, GuardConfig};
pub use store::TokenStore;
pub use token::{Claims, TokenError, User};
