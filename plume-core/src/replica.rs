//! Local document replica for Plume.
//!
//! The replica mirrors the content shown by the editor widget and is the
//! only place document state is mutated. Every change is validated and
//! applied to a scratch copy first; the replica is replaced only when the
//! whole change applies, so a rejected operation never leaves a partial edit
//! behind.
//!
//! Remote operations carry the document version the service assigned them.
//! Versions must arrive contiguously: an operation at or below the current
//! version is already part of the snapshot and is skipped, a gap means
//! something was lost and is reported as corruption.
//!
//! Local edits are pipelined: one is in flight at the service, later ones
//! wait in a queue until its echo arrives. An operation from another
//! participant is based on the service's document, which does not contain
//! our unacknowledged edits yet, so it is rebased over them with
//! [`transform`] before it is applied or rendered.

use std::collections::VecDeque;

use plume_types::{Attributes, Delta, DeltaError, DeltaOp};
use serde_json::Value;
use thiserror::Error;

use crate::operation::LocalOperation;
use crate::transform::{transform, OpIter};

/// Errors raised by the replica.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicaError {
    /// `bootstrap_from_snapshot` was called twice.
    #[error("replica already initialized")]
    AlreadyInitialized,

    /// An operation arrived before the snapshot was loaded.
    #[error("replica not initialized")]
    NotInitialized,

    /// An operation could not be applied consistently.
    #[error("replica corruption: {0}")]
    Corruption(String),
}

impl From<DeltaError> for ReplicaError {
    fn from(err: DeltaError) -> Self {
        ReplicaError::Corruption(err.to_string())
    }
}

/// Outcome of an operation from another participant.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteApplied {
    /// The operation was applied and the version advanced. Carries the
    /// change as applied locally, for the editor.
    Applied(Delta),
    /// The operation was already contained in the replica and was skipped.
    Stale,
}

/// Outcome of the service echoing one of our own operations.
#[derive(Debug, Clone, PartialEq)]
pub enum EchoApplied {
    /// The in-flight operation was acknowledged. Carries the next queued
    /// edit, now ready to submit.
    Confirmed(Option<LocalOperation>),
    /// The echo was already contained in the replica and was skipped.
    Stale,
}

/// The local copy of the shared document.
#[derive(Debug, Clone, Default)]
pub struct DocumentReplica {
    content: Delta,
    version: u64,
    /// Length of the service's document at `version`.
    confirmed_len: usize,
    /// Submitted and not yet echoed.
    in_flight: Option<Delta>,
    /// Captured after `in_flight`, each based on the one before.
    queued: VecDeque<Delta>,
    initialized: bool,
}

impl DocumentReplica {
    /// Create an uninitialized replica.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the initial snapshot. May only be called once.
    pub fn bootstrap_from_snapshot(
        &mut self,
        content: Delta,
        version: u64,
    ) -> Result<(), ReplicaError> {
        if self.initialized {
            return Err(ReplicaError::AlreadyInitialized);
        }
        content.ensure_document()?;
        self.confirmed_len = content.document_len();
        self.content = content;
        self.version = version;
        self.initialized = true;
        Ok(())
    }

    /// Apply an operation from another participant.
    ///
    /// The operation is based on the service's document at `version - 1`.
    /// It is rebased over our unacknowledged edits, which are in turn
    /// rebased over it. The replica reflects the operation when this returns
    /// [`RemoteApplied::Applied`].
    pub fn apply_remote_operation(
        &mut self,
        delta: &Delta,
        version: u64,
    ) -> Result<RemoteApplied, ReplicaError> {
        self.ensure_initialized()?;
        if self.check_version(version)? == Freshness::Stale {
            return Ok(RemoteApplied::Stale);
        }
        delta.validate()?;
        let needed = delta.base_len();
        if needed > self.confirmed_len {
            return Err(DeltaError::PastEnd {
                needed,
                available: self.confirmed_len,
            }
            .into());
        }

        let mut rebased = delta.clone();
        let in_flight = self.in_flight.as_ref().map(|pending| rebase(pending, &mut rebased));
        let queued: VecDeque<Delta> = self
            .queued
            .iter()
            .map(|pending| rebase(pending, &mut rebased))
            .collect();

        let next = apply(&self.content, &rebased)?;
        self.content = next;
        self.in_flight = in_flight;
        self.queued = queued;
        self.confirmed_len = delta.target_len(self.confirmed_len);
        self.version = version;
        Ok(RemoteApplied::Applied(rebased))
    }

    /// Record the service's echo of our in-flight operation.
    ///
    /// The content already contains the change, so only the version moves.
    /// The next queued edit, if any, becomes the in-flight one.
    pub fn confirm_local_echo(&mut self, version: u64) -> Result<EchoApplied, ReplicaError> {
        self.ensure_initialized()?;
        if self.check_version(version)? == Freshness::Stale {
            return Ok(EchoApplied::Stale);
        }
        let Some(confirmed) = self.in_flight.take() else {
            return Err(ReplicaError::Corruption(format!(
                "echo for version {version} with no operation in flight"
            )));
        };
        self.confirmed_len = confirmed.target_len(self.confirmed_len);
        self.version = version;

        let next = self.queued.pop_front().map(|delta| {
            self.in_flight = Some(delta.clone());
            LocalOperation::new(delta, version)
        });
        Ok(EchoApplied::Confirmed(next))
    }

    /// Take a user edit reported by the editor.
    ///
    /// The editor already shows the change; the replica follows it. The edit
    /// comes back ready for submission if nothing else is in flight,
    /// otherwise it waits in the queue.
    pub fn capture_local_operation(
        &mut self,
        delta: Delta,
    ) -> Result<Option<LocalOperation>, ReplicaError> {
        self.ensure_initialized()?;
        let next = apply(&self.content, &delta)?;
        self.content = next;
        if self.in_flight.is_some() {
            self.queued.push_back(delta);
            return Ok(None);
        }
        self.in_flight = Some(delta.clone());
        Ok(Some(LocalOperation::new(delta, self.version)))
    }

    /// Current document content.
    pub fn current_content(&self) -> &Delta {
        &self.content
    }

    /// Current content as plain text.
    pub fn plain_text(&self) -> String {
        self.content.plain_text()
    }

    /// Document length in positions.
    pub fn len(&self) -> usize {
        self.content.document_len()
    }

    /// True if the document has no content.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Last version confirmed by the document service.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Local edits the service has not acknowledged yet.
    pub fn unacknowledged(&self) -> usize {
        self.queued.len() + usize::from(self.in_flight.is_some())
    }

    /// Whether the snapshot has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn ensure_initialized(&self) -> Result<(), ReplicaError> {
        if self.initialized {
            Ok(())
        } else {
            Err(ReplicaError::NotInitialized)
        }
    }

    fn check_version(&self, version: u64) -> Result<Freshness, ReplicaError> {
        let expected = self.version.saturating_add(1);
        if version < expected {
            Ok(Freshness::Stale)
        } else if version == expected {
            Ok(Freshness::Next)
        } else {
            Err(ReplicaError::Corruption(format!(
                "out-of-order operation: expected version {expected}, got {version}"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    Next,
    Stale,
}

/// Rebase a service operation over one of our pending edits and return the
/// pending edit rebased over the operation.
///
/// The service applied `remote` before our edit, so it wins ties.
fn rebase(pending: &Delta, remote: &mut Delta) -> Delta {
    let pending_after = transform(remote, pending, true);
    *remote = transform(pending, remote, false);
    pending_after
}

/// Apply a change to a document, returning the new document.
///
/// The change is checked structurally and must not retain or delete past the
/// end of the document. Content after the last op of the change is kept.
/// On retains, attributes are set, or removed when the value is `null`.
pub fn apply(document: &Delta, change: &Delta) -> Result<Delta, DeltaError> {
    document.ensure_document()?;
    change.validate()?;

    let available = document.document_len();
    let needed = change.base_len();
    if needed > available {
        return Err(DeltaError::PastEnd { needed, available });
    }
    let past_end = DeltaError::PastEnd { needed, available };

    let mut source = OpIter::new(&document.ops);
    let mut result = Delta::new();

    for op in &change.ops {
        match op {
            DeltaOp::Insert { insert, attributes } => result.push(DeltaOp::Insert {
                insert: insert.clone(),
                attributes: without_nulls(attributes.as_ref()),
            }),
            DeltaOp::Retain { retain, attributes } => {
                let mut remaining = *retain;
                while remaining > 0 {
                    let DeltaOp::Insert {
                        insert,
                        attributes: existing,
                    } = source.next_op(remaining)
                    else {
                        return Err(past_end);
                    };
                    remaining -= insert.len();
                    result.push(DeltaOp::Insert {
                        insert,
                        attributes: reformat(existing, attributes.as_ref()),
                    });
                }
            }
            DeltaOp::Delete { delete } => {
                let mut remaining = *delete;
                while remaining > 0 {
                    let DeltaOp::Insert { insert, .. } = source.next_op(remaining) else {
                        return Err(past_end);
                    };
                    remaining -= insert.len();
                }
            }
        }
    }

    while source.has_next() {
        result.push(source.next_op(usize::MAX));
    }

    Ok(result)
}

fn without_nulls(attributes: Option<&Attributes>) -> Option<Attributes> {
    let kept: Attributes = attributes?
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    (!kept.is_empty()).then_some(kept)
}

fn reformat(existing: Option<Attributes>, changes: Option<&Attributes>) -> Option<Attributes> {
    let Some(changes) = changes else {
        return existing;
    };
    let mut merged = existing.unwrap_or_default();
    for (key, value) in changes {
        match value {
            Value::Null => {
                merged.remove(key);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    (!merged.is_empty()).then_some(merged)
}
