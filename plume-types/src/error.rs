//! Error types for Plume wire data.

use thiserror::Error;

/// Errors that can occur encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// Colour string was neither `rgb(r, g, b)` nor `#rrggbb`
    #[error("invalid colour: {0}")]
    InvalidColour(String),

    /// Participant id was empty or otherwise unusable
    #[error("invalid participant id: {0:?}")]
    InvalidParticipantId(String),
}

/// Errors raised while validating or applying a [`Delta`](crate::Delta).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    /// A retain or delete of length zero
    #[error("zero-length {0} at op {1}")]
    ZeroLength(&'static str, usize),

    /// An insert with no content
    #[error("empty insert at op {0}")]
    EmptyInsert(usize),

    /// The change reaches beyond the end of the document
    #[error("change covers {needed} positions but document has {available}")]
    PastEnd {
        /// Positions the change retains or deletes.
        needed: usize,
        /// Length of the document it was applied to.
        available: usize,
    },

    /// A document must consist of inserts only
    #[error("document contains a non-insert op at {0}")]
    NotADocument(usize),
}
