//! # plume-types
//!
//! Wire format types for Plume collaborative rich-text sync.
//!
//! This crate provides the foundational types used across all Plume crates:
//! - [`ParticipantId`], [`DocumentKey`] - Identity types
//! - [`Delta`], [`DeltaOp`] - Rich-text operations and document content
//! - [`PresenceMessage`] - Cursor traffic exchanged over the transport
//! - [`Rgb`] - Cursor colours
//! - [`WireError`], [`DeltaError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod colour;
mod delta;
mod error;
mod ids;
mod presence;

pub use colour::Rgb;
pub use delta::{Attributes, Delta, DeltaOp, Insert};
pub use error::{DeltaError, WireError};
pub use ids::{DocumentKey, ParticipantId};
pub use presence::{CursorPayload, LeavePayload, PresenceMessage};
