//! Ticket submission.
//!
//! The ticket client depends on the session manager only for a bearer token.
//! Form input is checked with the validators in [`validate`] before anything
//! is sent.

pub mod client;
pub mod validate;

pub use client::{Attachment, NewTicket, Priority, Ticket, TicketClient, TicketError};
pub use validate::{validate_email, validate_max_len, validate_required, ValidationError};
