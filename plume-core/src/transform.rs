//! Rebasing concurrent changes.
//!
//! Two changes made against the same document version cannot both be
//! applied as they are: positions in the second one are wrong once the first
//! has landed. [`transform`] rewrites a change so it applies after another,
//! using the same rules as the rich-text type the document service runs:
//!
//! - inserts at the same position are ordered by the `applied_first` flag,
//!   the side that wins goes first
//! - a range deleted by the applied change is dropped from the other
//! - formatting on the same range keeps the winner's value for shared keys
//!
//! The service transforms a late submission with `applied_first = true`
//! against everything it applied after the submission's base version. A
//! client rebases an incoming operation over its own unacknowledged changes
//! with `applied_first = false`, which gives both sides the same document.

use plume_types::{Attributes, Delta, DeltaOp, Insert};

/// Rewrite `change` so it applies to the document after `applied`.
///
/// Both deltas must be based on the same document.
pub fn transform(applied: &Delta, change: &Delta, applied_first: bool) -> Delta {
    let mut ours = OpIter::new(&applied.ops);
    let mut theirs = OpIter::new(&change.ops);
    let mut result = Delta::new();

    while ours.has_next() || theirs.has_next() {
        if ours.peek_is_insert() && (applied_first || !theirs.peek_is_insert()) {
            let skipped = ours.next_op(usize::MAX).len();
            result.push(plain_retain(skipped));
        } else if theirs.peek_is_insert() {
            result.push(theirs.next_op(usize::MAX));
        } else {
            let length = ours.peek_len().min(theirs.peek_len());
            let our_op = ours.next_op(length);
            let their_op = theirs.next_op(length);
            match (our_op, their_op) {
                // Already gone; nothing left for their op to touch
                (DeltaOp::Delete { .. }, _) => {}
                (_, DeltaOp::Delete { delete }) => result.push(DeltaOp::Delete { delete }),
                (our_op, their_op) => result.push(DeltaOp::Retain {
                    retain: length,
                    attributes: transform_attributes(
                        our_op.attributes(),
                        their_op.attributes(),
                        applied_first,
                    ),
                }),
            }
        }
    }

    result.chop()
}

fn plain_retain(count: usize) -> DeltaOp {
    DeltaOp::Retain {
        retain: count,
        attributes: None,
    }
}

fn transform_attributes(
    applied: Option<&Attributes>,
    change: Option<&Attributes>,
    applied_first: bool,
) -> Option<Attributes> {
    let change = change?;
    let Some(applied) = applied else {
        return Some(change.clone());
    };
    if !applied_first {
        return Some(change.clone());
    }
    let kept: Attributes = change
        .iter()
        .filter(|(key, _)| !applied.contains_key(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    (!kept.is_empty()).then_some(kept)
}

/// Walks a delta's ops, handing out pieces of at most a requested length.
///
/// Past the last op it behaves as an endless plain retain.
pub(crate) struct OpIter<'a> {
    ops: &'a [DeltaOp],
    index: usize,
    offset: usize,
}

impl<'a> OpIter<'a> {
    pub(crate) fn new(ops: &'a [DeltaOp]) -> Self {
        Self {
            ops,
            index: 0,
            offset: 0,
        }
    }

    pub(crate) fn has_next(&self) -> bool {
        self.index < self.ops.len()
    }

    fn peek_is_insert(&self) -> bool {
        matches!(self.ops.get(self.index), Some(DeltaOp::Insert { .. }))
    }

    fn peek_len(&self) -> usize {
        self.ops
            .get(self.index)
            .map_or(usize::MAX, |op| op.len() - self.offset)
    }

    /// Take up to `max` positions from the current op.
    pub(crate) fn next_op(&mut self, max: usize) -> DeltaOp {
        let Some(op) = self.ops.get(self.index) else {
            return plain_retain(max);
        };
        let remaining = op.len() - self.offset;
        let count = remaining.min(max);

        let piece = match op {
            DeltaOp::Insert { insert, attributes } => DeltaOp::Insert {
                insert: match insert {
                    Insert::Text(text) => {
                        Insert::Text(char_slice(text, self.offset, count).to_string())
                    }
                    Insert::Embed(embed) => Insert::Embed(embed.clone()),
                },
                attributes: attributes.clone(),
            },
            DeltaOp::Retain { attributes, .. } => DeltaOp::Retain {
                retain: count,
                attributes: attributes.clone(),
            },
            DeltaOp::Delete { .. } => DeltaOp::Delete { delete: count },
        };

        if count == remaining {
            self.index += 1;
            self.offset = 0;
        } else {
            self.offset += count;
        }
        piece
    }
}

fn char_slice(text: &str, start: usize, count: usize) -> &str {
    let byte_at = |pos: usize| text.char_indices().nth(pos).map_or(text.len(), |(i, _)| i);
    &text[byte_at(start)..byte_at(start + count)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::apply;
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Option<Attributes> {
        value.as_object().cloned()
    }

    /// Both orders of applying `a` and `b` to `doc` must agree.
    fn assert_converges(doc: &Delta, a: &Delta, b: &Delta) -> Delta {
        let a_then_b = apply(&apply(doc, a).unwrap(), &transform(a, b, true)).unwrap();
        let b_then_a = apply(&apply(doc, b).unwrap(), &transform(b, a, false)).unwrap();
        assert_eq!(a_then_b, b_then_a);
        a_then_b
    }

    // ===========================================
    // Inserts
    // ===========================================

    #[test]
    fn insert_before_shifts_later_insert() {
        let result = transform(
            &Delta::new().insert("Y"),
            &Delta::new().retain(3).insert("X"),
            false,
        );
        assert_eq!(result, Delta::new().retain(4).insert("X"));
    }

    #[test]
    fn insert_after_leaves_earlier_insert_alone() {
        let result = transform(
            &Delta::new().retain(3).insert("X"),
            &Delta::new().insert("Y"),
            true,
        );
        assert_eq!(result, Delta::new().insert("Y"));
    }

    #[test]
    fn tie_goes_to_the_side_applied_first() {
        let applied = Delta::new().retain(1).insert("A");
        let change = Delta::new().retain(1).insert("B");

        assert_eq!(
            transform(&applied, &change, true),
            Delta::new().retain(2).insert("B")
        );
        assert_eq!(
            transform(&applied, &change, false),
            Delta::new().retain(1).insert("B")
        );
    }

    #[test]
    fn concurrent_inserts_converge() {
        let doc = Delta::new().insert("abc");
        let result = assert_converges(
            &doc,
            &Delta::new().retain(3).insert("X"),
            &Delta::new().insert("Y"),
        );
        assert_eq!(result.plain_text(), "YabcX");

        let result = assert_converges(
            &doc,
            &Delta::new().retain(1).insert("A"),
            &Delta::new().retain(1).insert("B"),
        );
        assert_eq!(result.plain_text(), "aABbc");
    }

    // ===========================================
    // Deletes
    // ===========================================

    #[test]
    fn overlapping_deletes_remove_once() {
        let doc = Delta::new().insert("abcdef");
        let result = assert_converges(
            &doc,
            &Delta::new().retain(1).delete(3),
            &Delta::new().retain(2).delete(3),
        );
        assert_eq!(result.plain_text(), "af");
    }

    #[test]
    fn insert_inside_deleted_range_survives() {
        let doc = Delta::new().insert("abcdef");
        let result = assert_converges(
            &doc,
            &Delta::new().retain(1).delete(4),
            &Delta::new().retain(3).insert("X"),
        );
        assert_eq!(result.plain_text(), "aXf");
    }

    #[test]
    fn formatting_a_deleted_range_is_dropped() {
        let result = transform(
            &Delta::new().delete(3),
            &Delta::new().retain_with(3, attrs(json!({"bold": true}))),
            false,
        );
        assert!(result.is_empty());
    }

    // ===========================================
    // Formatting
    // ===========================================

    #[test]
    fn conflicting_formats_keep_first_value() {
        let doc = Delta::new().insert("hello");
        let a = Delta::new().retain_with(5, attrs(json!({"colour": "red"})));
        let b = Delta::new().retain_with(5, attrs(json!({"colour": "blue", "bold": true})));

        let result = assert_converges(&doc, &a, &b);

        assert_eq!(
            result,
            Delta::new().insert_with("hello", attrs(json!({"colour": "red", "bold": true})))
        );
    }

    #[test]
    fn formatting_follows_moved_text() {
        let doc = Delta::new().insert("hello");
        let result = assert_converges(
            &doc,
            &Delta::new().insert(">> "),
            &Delta::new().retain(1).retain_with(2, attrs(json!({"italic": true}))),
        );
        assert_eq!(
            result,
            Delta::new()
                .insert(">> h")
                .insert_with("el", attrs(json!({"italic": true})))
                .insert("lo")
        );
    }

    #[test]
    fn multibyte_inserts_split_on_chars() {
        let doc = Delta::new().insert("héllo");
        let result = assert_converges(
            &doc,
            &Delta::new().retain(1).insert("çà"),
            &Delta::new().retain(2).delete(2),
        );
        assert_eq!(result.plain_text(), "hçàéo");
    }

    #[test]
    fn empty_change_stays_empty() {
        assert!(transform(&Delta::new().insert("abc"), &Delta::new(), true).is_empty());
    }
}
