//! Rich-text deltas.
//!
//! A [`Delta`] is an ordered list of insert/retain/delete ops. The same type
//! represents both document content (inserts only) and changes to it. The
//! JSON shape matches the editor widget and the document service:
//! `{"ops": [{"insert": "hi", "attributes": {"bold": true}}, {"retain": 2}, {"delete": 1}]}`.
//!
//! Lengths count Unicode scalar values; an embed counts as one position.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::DeltaError;

/// Formatting attributes attached to an insert or retain.
pub type Attributes = serde_json::Map<String, Value>;

/// Content of an insert op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Insert {
    /// A run of text.
    Text(String),
    /// A single embedded object such as an image or formula.
    Embed(serde_json::Map<String, Value>),
}

impl Insert {
    /// Number of document positions this insert occupies.
    pub fn len(&self) -> usize {
        match self {
            Insert::Text(text) => text.chars().count(),
            Insert::Embed(_) => 1,
        }
    }

    /// True for an empty text run.
    pub fn is_empty(&self) -> bool {
        matches!(self, Insert::Text(text) if text.is_empty())
    }
}

/// A single op inside a [`Delta`].
///
/// On the wire each op is an object with exactly one of `insert`, `retain`
/// or `delete`. Anything else fails to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeltaOp {
    /// Insert content at the current position.
    Insert {
        /// Inserted content.
        insert: Insert,
        /// Formatting of the inserted content.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },
    /// Keep `retain` positions, optionally reformatting them.
    Retain {
        /// Number of positions kept.
        retain: usize,
        /// Formatting changes; a `null` value removes the attribute.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },
    /// Remove `delete` positions.
    Delete {
        /// Number of positions removed.
        delete: usize,
    },
}

/// Wire form of an op before the kind is decided.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOp {
    insert: Option<Insert>,
    retain: Option<usize>,
    delete: Option<usize>,
    #[serde(default)]
    attributes: Option<Attributes>,
}

impl TryFrom<RawOp> for DeltaOp {
    type Error = &'static str;

    fn try_from(raw: RawOp) -> Result<Self, Self::Error> {
        match (raw.insert, raw.retain, raw.delete) {
            (Some(insert), None, None) => Ok(DeltaOp::Insert {
                insert,
                attributes: raw.attributes,
            }),
            (None, Some(retain), None) => Ok(DeltaOp::Retain {
                retain,
                attributes: raw.attributes,
            }),
            (None, None, Some(delete)) if raw.attributes.is_none() => {
                Ok(DeltaOp::Delete { delete })
            }
            (None, None, Some(_)) => Err("delete op cannot carry attributes"),
            _ => Err("op must have exactly one of insert, retain or delete"),
        }
    }
}

impl<'de> Deserialize<'de> for DeltaOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawOp::deserialize(deserializer)?;
        DeltaOp::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl DeltaOp {
    /// Length of this op in document positions.
    pub fn len(&self) -> usize {
        match self {
            DeltaOp::Insert { insert, .. } => insert.len(),
            DeltaOp::Retain { retain, .. } => *retain,
            DeltaOp::Delete { delete } => *delete,
        }
    }

    /// True if the op covers no positions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attributes of an insert or retain.
    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            DeltaOp::Insert { attributes, .. } | DeltaOp::Retain { attributes, .. } => {
                attributes.as_ref()
            }
            DeltaOp::Delete { .. } => None,
        }
    }
}

/// An ordered list of rich-text ops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// The ops, in application order.
    pub ops: Vec<DeltaOp>,
}

impl Delta {
    /// Create an empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a delta from raw ops without normalizing them.
    pub fn from_ops(ops: Vec<DeltaOp>) -> Self {
        Self { ops }
    }

    /// Append an unformatted text insert.
    pub fn insert(self, text: impl Into<String>) -> Self {
        self.insert_with(text, None)
    }

    /// Append a text insert with optional formatting.
    pub fn insert_with(mut self, text: impl Into<String>, attributes: Option<Attributes>) -> Self {
        self.push(DeltaOp::Insert {
            insert: Insert::Text(text.into()),
            attributes: non_empty(attributes),
        });
        self
    }

    /// Append an embed insert.
    pub fn insert_embed(
        mut self,
        embed: serde_json::Map<String, Value>,
        attributes: Option<Attributes>,
    ) -> Self {
        self.push(DeltaOp::Insert {
            insert: Insert::Embed(embed),
            attributes: non_empty(attributes),
        });
        self
    }

    /// Append a plain retain.
    pub fn retain(self, count: usize) -> Self {
        self.retain_with(count, None)
    }

    /// Append a retain that reformats the retained range.
    pub fn retain_with(mut self, count: usize, attributes: Option<Attributes>) -> Self {
        self.push(DeltaOp::Retain {
            retain: count,
            attributes: non_empty(attributes),
        });
        self
    }

    /// Append a delete.
    pub fn delete(mut self, count: usize) -> Self {
        self.push(DeltaOp::Delete { delete: count });
        self
    }

    /// Append an op, merging it into the previous op when both have the
    /// same kind and formatting. Zero-length ops are dropped.
    pub fn push(&mut self, op: DeltaOp) {
        if op.is_empty() {
            return;
        }
        if let Some(last) = self.ops.last_mut() {
            match (last, &op) {
                (DeltaOp::Delete { delete: prev }, DeltaOp::Delete { delete }) => {
                    *prev = prev.saturating_add(*delete);
                    return;
                }
                (
                    DeltaOp::Retain {
                        retain: prev,
                        attributes: prev_attrs,
                    },
                    DeltaOp::Retain { retain, attributes },
                ) if *prev_attrs == *attributes => {
                    *prev = prev.saturating_add(*retain);
                    return;
                }
                (
                    DeltaOp::Insert {
                        insert: Insert::Text(prev),
                        attributes: prev_attrs,
                    },
                    DeltaOp::Insert {
                        insert: Insert::Text(text),
                        attributes,
                    },
                ) if *prev_attrs == *attributes => {
                    prev.push_str(text);
                    return;
                }
                _ => {}
            }
        }
        self.ops.push(op);
    }

    /// True if the delta has no ops.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Length of the document this delta describes (sum of inserts).
    pub fn document_len(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DeltaOp::Insert { .. }))
            .map(DeltaOp::len)
            .fold(0, usize::saturating_add)
    }

    /// Number of existing positions this change consumes (retains and deletes).
    ///
    /// Saturates at `usize::MAX`, which no document can satisfy.
    pub fn base_len(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| !matches!(op, DeltaOp::Insert { .. }))
            .map(DeltaOp::len)
            .fold(0, usize::saturating_add)
    }

    /// Number of positions this change removes.
    pub fn deleted_len(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DeltaOp::Delete { .. }))
            .map(DeltaOp::len)
            .fold(0, usize::saturating_add)
    }

    /// Length of the document after applying this change to one of
    /// `base` positions.
    ///
    /// Only meaningful once the change is known to fit, i.e.
    /// `base_len() <= base`.
    pub fn target_len(&self, base: usize) -> usize {
        base.saturating_sub(self.deleted_len())
            .saturating_add(self.document_len())
    }

    /// Drop a trailing plain retain, which changes nothing.
    pub fn chop(mut self) -> Self {
        if let Some(DeltaOp::Retain {
            attributes: None, ..
        }) = self.ops.last()
        {
            self.ops.pop();
        }
        self
    }

    /// Structural check: no zero-length retains or deletes, no empty inserts.
    pub fn validate(&self) -> Result<(), DeltaError> {
        for (index, op) in self.ops.iter().enumerate() {
            match op {
                DeltaOp::Insert { insert, .. } if insert.is_empty() => {
                    return Err(DeltaError::EmptyInsert(index));
                }
                DeltaOp::Retain { retain: 0, .. } => {
                    return Err(DeltaError::ZeroLength("retain", index));
                }
                DeltaOp::Delete { delete: 0 } => {
                    return Err(DeltaError::ZeroLength("delete", index));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Check that this delta is valid document content (inserts only).
    pub fn ensure_document(&self) -> Result<(), DeltaError> {
        self.validate()?;
        match self
            .ops
            .iter()
            .position(|op| !matches!(op, DeltaOp::Insert { .. }))
        {
            Some(index) => Err(DeltaError::NotADocument(index)),
            None => Ok(()),
        }
    }

    /// Concatenated text of all text inserts. Embeds are skipped.
    pub fn plain_text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DeltaOp::Insert {
                    insert: Insert::Text(text),
                    ..
                } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn non_empty(attributes: Option<Attributes>) -> Option<Attributes> {
    attributes.filter(|attrs| !attrs.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bold() -> Option<Attributes> {
        json!({"bold": true}).as_object().cloned()
    }

    #[test]
    fn parses_editor_json() {
        let delta: Delta = serde_json::from_value(json!({
            "ops": [
                {"retain": 3},
                {"insert": "hi", "attributes": {"bold": true}},
                {"delete": 2},
                {"insert": {"image": "cat.png"}}
            ]
        }))
        .unwrap();

        assert_eq!(delta.ops.len(), 4);
        assert!(matches!(delta.ops[0], DeltaOp::Retain { retain: 3, .. }));
        assert!(matches!(
            &delta.ops[1],
            DeltaOp::Insert { insert: Insert::Text(t), attributes: Some(_) } if t == "hi"
        ));
        assert!(matches!(delta.ops[2], DeltaOp::Delete { delete: 2 }));
        assert!(matches!(
            &delta.ops[3],
            DeltaOp::Insert {
                insert: Insert::Embed(_),
                ..
            }
        ));
    }

    #[test]
    fn serializes_without_empty_attributes() {
        let delta = Delta::new().insert("a").retain(1);
        let value = serde_json::to_value(&delta).unwrap();
        assert_eq!(value, json!({"ops": [{"insert": "a"}, {"retain": 1}]}));
    }

    #[test]
    fn push_merges_compatible_neighbours() {
        let delta = Delta::new()
            .insert("a")
            .insert("b")
            .insert_with("c", bold())
            .retain(1)
            .retain(2)
            .delete(1)
            .delete(1);

        assert_eq!(
            delta.ops,
            vec![
                DeltaOp::Insert {
                    insert: Insert::Text("ab".into()),
                    attributes: None
                },
                DeltaOp::Insert {
                    insert: Insert::Text("c".into()),
                    attributes: bold()
                },
                DeltaOp::Retain {
                    retain: 3,
                    attributes: None
                },
                DeltaOp::Delete { delete: 2 },
            ]
        );
    }

    #[test]
    fn push_drops_zero_length_ops() {
        let delta = Delta::new().insert("").retain(0).delete(0);
        assert!(delta.is_empty());
    }

    #[test]
    fn lengths_count_chars_and_embeds() {
        let embed = json!({"image": "x"}).as_object().cloned().unwrap();
        let doc = Delta::new().insert("héllo").insert_embed(embed, None);
        assert_eq!(doc.document_len(), 6);

        let change = Delta::new().retain(2).insert("zz").delete(3);
        assert_eq!(change.base_len(), 5);
    }

    #[test]
    fn validate_flags_degenerate_ops() {
        let zero_retain = Delta::from_ops(vec![DeltaOp::Retain {
            retain: 0,
            attributes: None,
        }]);
        assert_eq!(
            zero_retain.validate(),
            Err(DeltaError::ZeroLength("retain", 0))
        );

        let empty_insert = Delta::from_ops(vec![
            DeltaOp::Delete { delete: 1 },
            DeltaOp::Insert {
                insert: Insert::Text(String::new()),
                attributes: None,
            },
        ]);
        assert_eq!(empty_insert.validate(), Err(DeltaError::EmptyInsert(1)));
    }

    #[test]
    fn ensure_document_rejects_retain() {
        let change = Delta::new().insert("a").retain(1);
        assert_eq!(change.ensure_document(), Err(DeltaError::NotADocument(1)));
        assert!(Delta::new().insert("a").ensure_document().is_ok());
        assert!(Delta::new().ensure_document().is_ok());
    }

    #[test]
    fn huge_lengths_saturate_instead_of_overflowing() {
        let change = Delta::from_ops(vec![
            DeltaOp::Retain {
                retain: usize::MAX,
                attributes: None,
            },
            DeltaOp::Delete { delete: 2 },
        ]);
        assert_eq!(change.base_len(), usize::MAX);

        let merged = Delta::new().delete(usize::MAX).delete(3);
        assert_eq!(merged.ops, vec![DeltaOp::Delete { delete: usize::MAX }]);
    }

    #[test]
    fn target_len_accounts_for_inserts_and_deletes() {
        let change = Delta::new().retain(2).insert("xyz").delete(1);
        assert_eq!(change.target_len(5), 7);
    }

    #[test]
    fn chop_drops_trailing_plain_retain_only() {
        assert_eq!(
            Delta::new().insert("a").retain(3).chop(),
            Delta::new().insert("a")
        );
        let formatted = Delta::new().retain_with(3, bold());
        assert_eq!(formatted.clone().chop(), formatted);
    }

    #[test]
    fn op_with_two_kinds_is_rejected() {
        let result: Result<Delta, _> =
            serde_json::from_value(json!({"ops": [{"insert": "a", "delete": 3}]}));
        assert!(result.is_err());

        let result: Result<Delta, _> =
            serde_json::from_value(json!({"ops": [{"retain": 1, "delete": 1}]}));
        assert!(result.is_err());
    }

    #[test]
    fn op_without_a_kind_is_rejected() {
        let result: Result<Delta, _> =
            serde_json::from_value(json!({"ops": [{"attributes": {"bold": true}}]}));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_op_keys_and_formatted_deletes_are_rejected() {
        let result: Result<Delta, _> =
            serde_json::from_value(json!({"ops": [{"insert": "a", "colour": "red"}]}));
        assert!(result.is_err());

        let result: Result<Delta, _> = serde_json::from_value(
            json!({"ops": [{"delete": 1, "attributes": {"bold": true}}]}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn plain_text_skips_embeds() {
        let embed = json!({"image": "x"}).as_object().cloned().unwrap();
        let doc = Delta::new()
            .insert("a")
            .insert_embed(embed, None)
            .insert_with("b", bold());
        assert_eq!(doc.plain_text(), "ab");
    }
}
