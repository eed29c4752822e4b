//! Document service abstraction for Plume.
//!
//! The document service owns the authoritative copy of each document. It
//! orders every submitted operation, assigns it the next version and
//! delivers it to all subscribers. The submitter receives its own operation
//! back tagged [`OpOrigin::LocalEcho`](plume_core::OpOrigin::LocalEcho).
//!
//! Every submission names the version it was made against. The service
//! transforms it over whatever it applied since then, with the earlier
//! operations winning ties, and delivers the transformed change. A
//! subscriber receives operations as the service applied them and rebases
//! them over its own unacknowledged edits; see [`plume_core::transform`].
//!
//! # Example
//!
//! ```ignore
//! let hub = MemoryDocumentHub::new();
//! let docs = hub.connect();
//! let mut ops = docs.subscribe(&key).await?;
//! let snapshot = docs.fetch(&key).await?;
//! docs.submit_op(&key, &Delta::new().insert("hi"), snapshot.version).await?;
//! ```

mod memory;

pub use memory::{MemoryDocumentHub, MemoryDocumentService};

use async_trait::async_trait;
use plume_core::{RemoteOperation, Snapshot};
use plume_types::{Delta, DocumentKey};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

/// Document service errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document does not exist.
    #[error("document not found: {0}")]
    NotFound(DocumentKey),

    /// The document was created by someone else first.
    #[error("document already exists: {0}")]
    CreateConflict(DocumentKey),

    /// The service refused an operation.
    #[error("operation rejected: {0}")]
    Rejected(String),

    /// The service is gone.
    #[error("document service closed")]
    Closed,
}

/// Access to the shared documents.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Start receiving operations for a document.
    ///
    /// Operations are delivered in version order. Subscribing to a document
    /// that does not exist yet is allowed.
    async fn subscribe(
        &self,
        key: &DocumentKey,
    ) -> Result<UnboundedReceiver<RemoteOperation>, DocumentError>;

    /// Fetch the current snapshot.
    ///
    /// A missing document is not an error; its snapshot has no type.
    async fn fetch(&self, key: &DocumentKey) -> Result<Snapshot, DocumentError>;

    /// Create a document.
    async fn create(
        &self,
        key: &DocumentKey,
        doc_type: &str,
        initial: &Delta,
    ) -> Result<(), DocumentError>;

    /// Submit an operation made against `base_version`; returns the version
    /// it was assigned.
    ///
    /// A base version the service does not know is
    /// [`DocumentError::Rejected`].
    async fn submit_op(
        &self,
        key: &DocumentKey,
        delta: &Delta,
        base_version: u64,
    ) -> Result<u64, DocumentError>;

    /// Stop receiving operations for a document.
    async fn unsubscribe(&self, key: &DocumentKey) -> Result<(), DocumentError>;
}
