//! Authentication module for managing the user's session.
//!
//! This module provides:
//! - `SessionState`: Login, registration and logout against the issuing
//!   service, with the signed-in user derived from the stored token
//! - `Navigator`: Where the session sends the user after a transition
//! - `AuthError`: Failures absorbed at the session boundary

pub mod error;
pub mod navigator;
pub mod session;

pub use error::AuthError;
pub use navigator::{NavigationLog, Navigator};
pub use session::{RegisterPayload, Session, SessionConfig, SessionState};
