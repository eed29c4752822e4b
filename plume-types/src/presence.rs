//! Presence messages exchanged over the transport.
//!
//! Cursor traffic is JSON shaped as the editor clients expect it:
//!
//! ```json
//! { "cursor": { "id": "id-7", "start": 3, "end": 5, "name": "Bob", "colour": "rgb(1, 2, 3)" } }
//! ```
//!
//! A participant that leaves may announce it with `{ "leave": { "id": "id-7" } }`.

use serde::{Deserialize, Serialize};

use crate::{ParticipantId, Rgb, WireError};

/// All presence messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceMessage {
    /// A participant's cursor moved or their selection changed.
    Cursor(CursorPayload),
    /// A participant disconnected.
    Leave(LeavePayload),
}

impl PresenceMessage {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Decode)
    }

    /// The participant this message is about.
    pub fn participant(&self) -> &ParticipantId {
        match self {
            PresenceMessage::Cursor(cursor) => &cursor.id,
            PresenceMessage::Leave(leave) => &leave.id,
        }
    }
}

/// A participant's selection plus display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPayload {
    /// Who the cursor belongs to
    pub id: ParticipantId,
    /// Selection start (document position)
    pub start: usize,
    /// Selection end; equal to `start` for a caret
    pub end: usize,
    /// Display name shown next to the cursor
    #[serde(default)]
    pub name: String,
    /// Cursor colour
    pub colour: Rgb,
}

impl CursorPayload {
    /// Selection bounds ordered so that `start <= end`.
    pub fn ordered_range(&self) -> (usize, usize) {
        (self.start.min(self.end), self.start.max(self.end))
    }
}

/// Disconnect notice for a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePayload {
    /// Participant that left
    pub id: ParticipantId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_editor_cursor_message() {
        let bytes = br#"{"cursor":{"id":"id-7","start":3,"end":5,"name":"Bob","colour":"rgb(1,2,3)"}}"#;
        let msg = PresenceMessage::from_bytes(bytes).unwrap();

        match msg {
            PresenceMessage::Cursor(cursor) => {
                assert_eq!(cursor.id.as_str(), "id-7");
                assert_eq!((cursor.start, cursor.end), (3, 5));
                assert_eq!(cursor.name, "Bob");
                assert_eq!(cursor.colour, Rgb::new(1, 2, 3));
            }
            other => panic!("Expected Cursor, got {:?}", other),
        }
    }

    #[test]
    fn encodes_wire_shape() {
        let msg = PresenceMessage::Cursor(CursorPayload {
            id: ParticipantId::parse("id-1").unwrap(),
            start: 0,
            end: 4,
            name: "Ann".into(),
            colour: Rgb::new(255, 0, 255),
        });
        let value: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"cursor": {"id": "id-1", "start": 0, "end": 4, "name": "Ann", "colour": "rgb(255, 0, 255)"}})
        );
    }

    #[test]
    fn missing_name_defaults_to_empty() {
        let bytes = br#"{"cursor":{"id":"id-7","start":1,"end":1,"colour":"rgb(0,0,0)"}}"#;
        let PresenceMessage::Cursor(cursor) = PresenceMessage::from_bytes(bytes).unwrap() else {
            panic!("Expected Cursor");
        };
        assert!(cursor.name.is_empty());
    }

    #[test]
    fn decodes_leave_notice() {
        let msg = PresenceMessage::from_bytes(br#"{"leave":{"id":"id-9"}}"#).unwrap();
        assert!(matches!(msg, PresenceMessage::Leave(_)));
        assert_eq!(msg.participant().as_str(), "id-9");
    }

    #[test]
    fn rejects_malformed_messages() {
        assert!(PresenceMessage::from_bytes(b"not json").is_err());
        assert!(PresenceMessage::from_bytes(br#"{"cursor":{"id":"","start":0,"end":0,"colour":"rgb(0,0,0)"}}"#).is_err());
        assert!(PresenceMessage::from_bytes(br#"{"cursor":{"id":"a","start":0,"end":0,"colour":"blue"}}"#).is_err());
        assert!(PresenceMessage::from_bytes(br#"{"wave":{}}"#).is_err());
    }

    #[test]
    fn ordered_range_handles_backwards_selection() {
        let cursor = CursorPayload {
            id: ParticipantId::parse("id-1").unwrap(),
            start: 8,
            end: 2,
            name: String::new(),
            colour: Rgb::default(),
        };
        assert_eq!(cursor.ordered_range(), (2, 8));
    }
}
