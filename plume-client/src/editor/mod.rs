//! Editor widget abstraction for Plume.
//!
//! The editor is the local rich-text widget. It reports user activity as
//! [`EditorEvent`]s and accepts content and cursor updates from the session.
//! Widget calls are local and synchronous.
//!
//! Pushing content into the widget makes it report a change of its own,
//! tagged [`ChangeSource::Api`]. The session ignores those.

mod mock;

pub use mock::MockEditor;

use plume_core::{ChangeSource, CursorState, Selection};
use plume_types::{Delta, ParticipantId};
use tokio::sync::mpsc::UnboundedReceiver;

/// Something the editor reports.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// The content changed.
    TextChange {
        /// The change.
        delta: Delta,
        /// Who caused it.
        source: ChangeSource,
    },
    /// The selection moved; `None` when the editor lost focus.
    SelectionChange(Option<Selection>),
}

/// The local rich-text widget.
pub trait Editor: Send + Sync {
    /// Start receiving editor events.
    fn subscribe(&self) -> UnboundedReceiver<EditorEvent>;

    /// Replace the whole content.
    fn set_contents(&self, content: &Delta);

    /// Apply a change to the content.
    fn update_contents(&self, delta: &Delta);

    /// Draw a remote participant's cursor.
    fn set_cursor(&self, cursor: &CursorState);

    /// Clear a remote participant's cursor.
    fn remove_cursor(&self, id: &ParticipantId);
}
