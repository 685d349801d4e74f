//! Authentication module for managing the widget's session lifecycle.
//!
//! This module provides:
//! - `SessionManager`: owns the observable `AuthState` and orchestrates
//!   login, logout, refresh and validation through a `BackendAdapter`
//! - `AuthSession` / `AuthUser`: the credential bundle and the identity it authorizes
//! - `normalize_session`: turns irregular backend payloads into one `AuthSession`
//!
//! Sessions persist through a `SessionStore` and default to a 24 hour lifetime
//! when the backend does not report one.

pub mod error;
pub mod listeners;
pub mod manager;
pub mod normalize;
pub mod types;

pub use error::AuthError;
pub use listeners::Subscription;
pub use manager::SessionManager;
pub use normalize::{normalize_session, RetainedCredentials};
pub use types::{AuthSession, AuthState, AuthUser, Credentials, DEFAULT_SESSION_LIFETIME_SECS};
