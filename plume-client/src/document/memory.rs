//! In-process document service.
//!
//! A [`MemoryDocumentHub`] holds the documents; each participant talks to it
//! through its own [`MemoryDocumentService`] handle. Each document keeps the
//! operations applied since it was created, so a submission made against an
//! older version is transformed over the ones that beat it.

use super::{DocumentError, DocumentService};
use async_trait::async_trait;
use plume_core::{apply, transform, RemoteOperation, Snapshot};
use plume_types::{Delta, DocumentKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Shared state behind every [`MemoryDocumentService`] handle.
#[derive(Debug, Default, Clone)]
pub struct MemoryDocumentHub {
    inner: Arc<Mutex<HubInner>>,
}

#[derive(Debug, Default)]
struct HubInner {
    docs: HashMap<DocumentKey, StoredDocument>,
    subscribers: HashMap<DocumentKey, Vec<Subscriber>>,
    next_connection: u64,
    pending_race: Option<(DocumentKey, Delta)>,
    fail_next_submit: Option<String>,
}

#[derive(Debug)]
struct StoredDocument {
    doc_type: String,
    content: Delta,
    version: u64,
    /// Applied operations; the last one produced `version`.
    history: Vec<Delta>,
}

impl StoredDocument {
    fn new(doc_type: &str, content: Delta) -> Self {
        Self {
            doc_type: doc_type.to_string(),
            content,
            version: 1,
            history: Vec::new(),
        }
    }

    /// Operations applied after `base_version`, oldest first.
    fn since(&self, base_version: u64) -> Option<&[Delta]> {
        let behind = usize::try_from(self.version.checked_sub(base_version)?).ok()?;
        let start = self.history.len().checked_sub(behind)?;
        Some(&self.history[start..])
    }
}

#[derive(Debug)]
struct Subscriber {
    connection: u64,
    sender: UnboundedSender<RemoteOperation>,
}

impl MemoryDocumentHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a participant handle.
    pub fn connect(&self) -> MemoryDocumentService {
        let mut inner = self.inner.lock().unwrap();
        inner.next_connection += 1;
        MemoryDocumentService {
            hub: self.clone(),
            connection: inner.next_connection,
        }
    }

    /// Seed a document directly, at version 1.
    pub fn insert_document(&self, key: &DocumentKey, doc_type: &str, content: Delta) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .docs
            .insert(key.clone(), StoredDocument::new(doc_type, content));
    }

    /// Make the next `create` for `key` lose a race.
    ///
    /// The document is created with `content` by a phantom participant just
    /// before the caller's create lands, which then fails with
    /// [`DocumentError::CreateConflict`].
    pub fn simulate_concurrent_create(&self, key: &DocumentKey, content: Delta) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending_race = Some((key.clone(), content));
    }

    /// Cause the next `submit_op` to be rejected.
    pub fn fail_next_submit(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_submit = Some(error.to_string());
    }

    /// Current content of a document.
    pub fn content(&self, key: &DocumentKey) -> Option<Delta> {
        let inner = self.inner.lock().unwrap();
        inner.docs.get(key).map(|doc| doc.content.clone())
    }

    /// Current version of a document.
    pub fn version(&self, key: &DocumentKey) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner.docs.get(key).map(|doc| doc.version)
    }

    /// Number of live subscriptions to a document.
    pub fn subscriber_count(&self, key: &DocumentKey) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .subscribers
            .get(key)
            .map(|subs| subs.iter().filter(|s| !s.sender.is_closed()).count())
            .unwrap_or(0)
    }
}

/// One participant's handle on a [`MemoryDocumentHub`].
#[derive(Debug, Clone)]
pub struct MemoryDocumentService {
    hub: MemoryDocumentHub,
    connection: u64,
}

impl MemoryDocumentService {
    /// The hub this handle talks to.
    pub fn hub(&self) -> &MemoryDocumentHub {
        &self.hub
    }
}

#[async_trait]
impl DocumentService for MemoryDocumentService {
    async fn subscribe(
        &self,
        key: &DocumentKey,
    ) -> Result<UnboundedReceiver<RemoteOperation>, DocumentError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.hub.inner.lock().unwrap();
        inner
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(Subscriber {
                connection: self.connection,
                sender,
            });
        Ok(receiver)
    }

    async fn fetch(&self, key: &DocumentKey) -> Result<Snapshot, DocumentError> {
        let inner = self.hub.inner.lock().unwrap();
        Ok(match inner.docs.get(key) {
            Some(doc) => Snapshot {
                doc_type: Some(doc.doc_type.clone()),
                content: doc.content.clone(),
                version: doc.version,
            },
            None => Snapshot::missing(),
        })
    }

    async fn create(
        &self,
        key: &DocumentKey,
        doc_type: &str,
        initial: &Delta,
    ) -> Result<(), DocumentError> {
        let mut inner = self.hub.inner.lock().unwrap();

        // Let the phantom participant win
        if matches!(&inner.pending_race, Some((raced, _)) if raced == key) {
            if let Some((raced, content)) = inner.pending_race.take() {
                inner
                    .docs
                    .insert(raced, StoredDocument::new(doc_type, content));
            }
        }

        if inner.docs.contains_key(key) {
            return Err(DocumentError::CreateConflict(key.clone()));
        }
        initial
            .ensure_document()
            .map_err(|e| DocumentError::Rejected(e.to_string()))?;

        inner
            .docs
            .insert(key.clone(), StoredDocument::new(doc_type, initial.clone()));
        Ok(())
    }

    async fn submit_op(
        &self,
        key: &DocumentKey,
        delta: &Delta,
        base_version: u64,
    ) -> Result<u64, DocumentError> {
        let mut guard = self.hub.inner.lock().unwrap();
        let inner = &mut *guard;

        if let Some(error) = inner.fail_next_submit.take() {
            return Err(DocumentError::Rejected(error));
        }

        let doc = inner
            .docs
            .get_mut(key)
            .ok_or_else(|| DocumentError::NotFound(key.clone()))?;
        delta
            .validate()
            .map_err(|e| DocumentError::Rejected(e.to_string()))?;
        let missed = doc.since(base_version).ok_or_else(|| {
            DocumentError::Rejected(format!(
                "unknown base version {base_version}, document is at {}",
                doc.version
            ))
        })?;

        let delta = missed
            .iter()
            .fold(delta.clone(), |change, applied| transform(applied, &change, true));
        doc.content =
            apply(&doc.content, &delta).map_err(|e| DocumentError::Rejected(e.to_string()))?;
        doc.history.push(delta.clone());
        doc.version += 1;
        let version = doc.version;

        if let Some(subscribers) = inner.subscribers.get_mut(key) {
            // Drop receivers that went away
            subscribers.retain(|sub| {
                let op = if sub.connection == self.connection {
                    RemoteOperation::echo(delta.clone(), version)
                } else {
                    RemoteOperation::remote(delta.clone(), version)
                };
                sub.sender.send(op).is_ok()
            });
        }
        Ok(version)
    }

    async fn unsubscribe(&self, key: &DocumentKey) -> Result<(), DocumentError> {
        let mut inner = self.hub.inner.lock().unwrap();
        if let Some(subscribers) = inner.subscribers.get_mut(key) {
            subscribers.retain(|sub| sub.connection != self.connection);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_core::OpOrigin;

    fn key() -> DocumentKey {
        DocumentKey::new("docs", "hello2")
    }

    // ===========================================
    // Fetch / Create Tests
    // ===========================================

    #[tokio::test]
    async fn missing_document_has_no_type() {
        let hub = MemoryDocumentHub::new();
        let docs = hub.connect();

        let snapshot = docs.fetch(&key()).await.unwrap();
        assert_eq!(snapshot, Snapshot::missing());
    }

    #[tokio::test]
    async fn create_then_fetch() {
        let hub = MemoryDocumentHub::new();
        let docs = hub.connect();

        docs.create(&key(), "rich-text", &Delta::new()).await.unwrap();

        let snapshot = docs.fetch(&key()).await.unwrap();
        assert_eq!(snapshot.doc_type.as_deref(), Some("rich-text"));
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.content.is_empty());
    }

    #[tokio::test]
    async fn second_create_conflicts() {
        let hub = MemoryDocumentHub::new();
        let a = hub.connect();
        let b = hub.connect();

        a.create(&key(), "rich-text", &Delta::new()).await.unwrap();
        let result = b.create(&key(), "rich-text", &Delta::new()).await;

        assert!(matches!(result, Err(DocumentError::CreateConflict(_))));
    }

    #[tokio::test]
    async fn simulated_race_loses_create_once() {
        let hub = MemoryDocumentHub::new();
        let docs = hub.connect();
        hub.simulate_concurrent_create(&key(), Delta::new().insert("first"));

        let result = docs.create(&key(), "rich-text", &Delta::new()).await;
        assert!(matches!(result, Err(DocumentError::CreateConflict(_))));

        let snapshot = docs.fetch(&key()).await.unwrap();
        assert_eq!(snapshot.content.plain_text(), "first");
    }

    // ===========================================
    // Submit / Subscribe Tests
    // ===========================================

    #[tokio::test]
    async fn submit_echoes_to_self_and_forwards_to_others() {
        let hub = MemoryDocumentHub::new();
        let a = hub.connect();
        let b = hub.connect();
        a.create(&key(), "rich-text", &Delta::new()).await.unwrap();

        let mut a_ops = a.subscribe(&key()).await.unwrap();
        let mut b_ops = b.subscribe(&key()).await.unwrap();

        let version = a
            .submit_op(&key(), &Delta::new().insert("hi"), 1)
            .await
            .unwrap();
        assert_eq!(version, 2);

        let echo = a_ops.recv().await.unwrap();
        assert_eq!(echo.origin, OpOrigin::LocalEcho);
        assert_eq!(echo.version, 2);

        let remote = b_ops.recv().await.unwrap();
        assert_eq!(remote.origin, OpOrigin::Remote);
        assert_eq!(remote.delta, Delta::new().insert("hi"));

        assert_eq!(hub.content(&key()).unwrap().plain_text(), "hi");
    }

    #[tokio::test]
    async fn submit_to_missing_document_fails() {
        let hub = MemoryDocumentHub::new();
        let docs = hub.connect();

        let result = docs.submit_op(&key(), &Delta::new().insert("x"), 1).await;
        assert!(matches!(result, Err(DocumentError::NotFound(_))));
    }

    #[tokio::test]
    async fn out_of_range_submit_is_rejected() {
        let hub = MemoryDocumentHub::new();
        let docs = hub.connect();
        docs.create(&key(), "rich-text", &Delta::new()).await.unwrap();

        let result = docs.submit_op(&key(), &Delta::new().delete(3), 1).await;
        assert!(matches!(result, Err(DocumentError::Rejected(_))));
        assert_eq!(hub.version(&key()), Some(1));
    }

    #[tokio::test]
    async fn forced_submit_failure() {
        let hub = MemoryDocumentHub::new();
        let docs = hub.connect();
        docs.create(&key(), "rich-text", &Delta::new()).await.unwrap();
        hub.fail_next_submit("offline");

        let result = docs.submit_op(&key(), &Delta::new().insert("x"), 1).await;
        assert!(matches!(result, Err(DocumentError::Rejected(_))));

        // Next submit should work
        docs.submit_op(&key(), &Delta::new().insert("x"), 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = MemoryDocumentHub::new();
        let a = hub.connect();
        let b = hub.connect();
        a.create(&key(), "rich-text", &Delta::new()).await.unwrap();

        let _b_ops = b.subscribe(&key()).await.unwrap();
        assert_eq!(hub.subscriber_count(&key()), 1);

        b.unsubscribe(&key()).await.unwrap();
        assert_eq!(hub.subscriber_count(&key()), 0);
    }

    #[tokio::test]
    async fn subscribing_before_create_receives_later_ops() {
        let hub = MemoryDocumentHub::new();
        let a = hub.connect();
        let b = hub.connect();

        let mut b_ops = b.subscribe(&key()).await.unwrap();
        a.create(&key(), "rich-text", &Delta::new()).await.unwrap();
        a.submit_op(&key(), &Delta::new().insert("x"), 1)
            .await
            .unwrap();

        assert_eq!(b_ops.recv().await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn late_submission_is_transformed_over_missed_ops() {
        let hub = MemoryDocumentHub::new();
        hub.insert_document(&key(), "rich-text", Delta::new().insert("abc"));
        let a = hub.connect();
        let b = hub.connect();
        let mut a_ops = a.subscribe(&key()).await.unwrap();

        a.submit_op(&key(), &Delta::new().retain(3).insert("X"), 1)
            .await
            .unwrap();
        // b had not seen a's op yet
        let version = b
            .submit_op(&key(), &Delta::new().retain(3).insert("Y"), 1)
            .await
            .unwrap();

        assert_eq!(version, 3);
        assert_eq!(hub.content(&key()).unwrap().plain_text(), "abcXY");

        a_ops.recv().await.unwrap();
        let forwarded = a_ops.recv().await.unwrap();
        assert_eq!(forwarded.origin, OpOrigin::Remote);
        assert_eq!(forwarded.delta, Delta::new().retain(4).insert("Y"));
    }

    #[tokio::test]
    async fn unknown_base_version_is_rejected() {
        let hub = MemoryDocumentHub::new();
        let docs = hub.connect();
        docs.create(&key(), "rich-text", &Delta::new()).await.unwrap();

        let ahead = docs.submit_op(&key(), &Delta::new().insert("x"), 7).await;
        assert!(matches!(ahead, Err(DocumentError::Rejected(_))));

        let before_creation = docs.submit_op(&key(), &Delta::new().insert("x"), 0).await;
        assert!(matches!(before_creation, Err(DocumentError::Rejected(_))));
        assert_eq!(hub.version(&key()), Some(1));
    }
}
