//! Core library for supportdesk.
//!
//! Session lifecycle and authentication state for an embeddable support
//! widget, plus the ticket client that rides on the session:
//! - [`auth`]: `SessionManager`, the observable `AuthState`, payload normalization
//! - [`api`]: the `BackendAdapter` seam and its two backend flavors
//! - [`store`]: `SessionStore` and its memory, file and keychain implementations
//! - [`tickets`]: form validation and the ticket/attachment client
//! - [`config`]: on-disk configuration with environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod store;
pub mod tickets;

pub use api::{adapter_for, AdapterConfig, ApiError, BackendAdapter, BackendFlavor, CredentialKind};
pub use auth::{AuthError, AuthSession, AuthState, AuthUser, Credentials, SessionManager, Subscription};
pub use config::Config;
pub use store::{open_store, SessionStore, StoreKind};
pub use tickets::{NewTicket, Priority, TicketClient, TicketError};
