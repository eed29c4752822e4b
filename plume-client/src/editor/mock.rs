//! Mock editor for testing.
//!
//! Mirrors the widget's content, records what the session rendered and
//! keeps the list of cursor markers a real widget would be drawing.

use super::{Editor, EditorEvent};
use plume_core::{apply, ChangeSource, CursorState, Selection};
use plume_types::{Delta, ParticipantId};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Mock editor for testing.
///
/// Like a real multi-cursor widget, `set_cursor` adds a marker without
/// looking for an existing one; only `remove_cursor` clears markers.
#[derive(Debug, Default)]
pub struct MockEditor {
    inner: Arc<Mutex<MockEditorInner>>,
}

#[derive(Debug, Default)]
struct MockEditorInner {
    content: Delta,
    rendered: Vec<Delta>,
    markers: Vec<CursorState>,
    listeners: Vec<UnboundedSender<EditorEvent>>,
    render_failures: usize,
}

impl MockEditorInner {
    fn notify(&mut self, event: EditorEvent) {
        self.listeners
            .retain(|listener| listener.send(event.clone()).is_ok());
    }

    fn change(&mut self, delta: &Delta, source: ChangeSource) -> bool {
        match apply(&self.content, delta) {
            Ok(next) => {
                self.content = next;
                self.notify(EditorEvent::TextChange {
                    delta: delta.clone(),
                    source,
                });
                true
            }
            Err(e) => {
                tracing::warn!("Mock editor refused change: {}", e);
                false
            }
        }
    }
}

impl MockEditor {
    /// Create an empty editor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the user typing `text` at `at`.
    pub fn type_text(&self, at: usize, text: &str) {
        self.user_change(Delta::new().retain(at).insert(text));
    }

    /// Simulate an arbitrary user change.
    ///
    /// Returns false if the change does not fit the current content.
    pub fn user_change(&self, delta: Delta) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.change(&delta, ChangeSource::User)
    }

    /// Simulate the user moving the selection.
    pub fn select(&self, selection: Option<Selection>) {
        let mut inner = self.inner.lock().unwrap();
        inner.notify(EditorEvent::SelectionChange(selection));
    }

    /// Current content.
    pub fn content(&self) -> Delta {
        let inner = self.inner.lock().unwrap();
        inner.content.clone()
    }

    /// Current content as plain text.
    pub fn plain_text(&self) -> String {
        let inner = self.inner.lock().unwrap();
        inner.content.plain_text()
    }

    /// Every delta passed to `update_contents`.
    pub fn rendered(&self) -> Vec<Delta> {
        let inner = self.inner.lock().unwrap();
        inner.rendered.clone()
    }

    /// Renders that did not fit the content.
    pub fn render_failures(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.render_failures
    }

    /// Cursor markers currently drawn.
    pub fn markers(&self) -> Vec<CursorState> {
        let inner = self.inner.lock().unwrap();
        inner.markers.clone()
    }

    /// Number of markers drawn for one participant.
    pub fn markers_for(&self, id: &ParticipantId) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .markers
            .iter()
            .filter(|marker| &marker.participant_id == id)
            .count()
    }
}

impl Clone for MockEditor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Editor for MockEditor {
    fn subscribe(&self) -> UnboundedReceiver<EditorEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        inner.listeners.push(sender);
        receiver
    }

    fn set_contents(&self, content: &Delta) {
        let mut inner = self.inner.lock().unwrap();
        let replace = content.clone().delete(inner.content.document_len());
        inner.change(&replace, ChangeSource::Api);
    }

    fn update_contents(&self, delta: &Delta) {
        let mut inner = self.inner.lock().unwrap();
        inner.rendered.push(delta.clone());
        if !inner.change(delta, ChangeSource::Api) {
            inner.render_failures += 1;
        }
    }

    fn set_cursor(&self, cursor: &CursorState) {
        let mut inner = self.inner.lock().unwrap();
        inner.markers.push(cursor.clone());
    }

    fn remove_cursor(&self, id: &ParticipantId) {
        let mut inner = self.inner.lock().unwrap();
        inner.markers.retain(|marker| &marker.participant_id != id);
    }
}
