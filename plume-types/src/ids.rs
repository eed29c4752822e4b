//! Identity types for Plume.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WireError;

const PREFIX: &str = "id-";

/// Identifies one connected participant for the lifetime of its session.
///
/// Generated ids are `id-` followed by a UUIDv7: a millisecond timestamp
/// plus 74 random bits, so two sessions started in the same instant still
/// get distinct ids. Ids issued elsewhere (e.g. by a server) are accepted
/// verbatim through [`ParticipantId::parse`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Generate a fresh id for this process.
    pub fn generate() -> Self {
        Self(format!("{PREFIX}{}", uuid::Uuid::now_v7()))
    }

    /// Accept an externally issued id.
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(WireError::InvalidParticipantId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.0)
    }
}

/// Key of the shared document: a collection plus a document name.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    /// Collection the document lives in.
    pub collection: String,
    /// Document name inside the collection.
    pub name: String,
}

impl DocumentKey {
    /// Create a key from its two parts.
    pub fn new(collection: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.name)
    }
}

impl fmt::Debug for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentKey({self})")
    }
}
