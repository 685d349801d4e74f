//! Backend adapter module for the ticketing API's authentication endpoints.
//!
//! This module provides the `BackendAdapter` trait and its two concrete
//! flavors:
//! - `TokenRefreshAdapter`: separate access/refresh tokens, `POST /auth/refresh`
//! - `VerifyAdapter`: a single bearer token re-checked against `/auth/external`
//!
//! Adapters only speak HTTP. They hand raw JSON payloads back to the
//! session manager, which owns normalization and state.

pub mod adapter;
pub mod error;
pub mod token_refresh;
pub mod verify;

pub use adapter::{adapter_for, AdapterConfig, BackendAdapter, BackendFlavor, CredentialKind};
pub use error::ApiError;
pub use token_refresh::TokenRefreshAdapter;
pub use verify::VerifyAdapter;
