//! Client-side canvas mirror with bounded undo/redo.
//!
//! A `HistoryStore` replays the server's command stream through the same
//! apply logic the server uses. It performs no reordering or deduplication:
//! correctness relies on in-order delivery from the connection.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use easel_core::config::DEFAULT_HISTORY_LIMIT;
use easel_core::error::EaselError;

use crate::apply::{apply_command, SnapshotLog};
use crate::model::{CanvasCommand, CanvasElementState};
use crate::protocol::ServerFrame;

/// Local copies of snapshots seen on the stream, keyed by resolved id.
#[derive(Default)]
struct LocalSnapshots {
    entries: HashMap<String, Vec<CanvasElementState>>,
    order: VecDeque<String>,
    max: Option<usize>,
}

impl LocalSnapshots {
    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl SnapshotLog for LocalSnapshots {
    fn record(
        &mut self,
        requested_id: Option<&str>,
        _label: Option<&str>,
        elements: &[CanvasElementState],
        _now: DateTime<Utc>,
    ) -> String {
        let id = requested_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.entries.insert(id.clone(), elements.to_vec()).is_none() {
            self.order.push_back(id.clone());
        }

        if let Some(max) = self.max {
            while self.order.len() > max {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
        id
    }

    fn find(&self, snapshot_id: &str) -> Option<Vec<CanvasElementState>> {
        self.entries.get(snapshot_id).cloned()
    }
}

/// Mirror of one canvas plus undo/redo stacks of full element lists.
pub struct HistoryStore {
    canvas_id: String,
    elements: Vec<CanvasElementState>,
    snapshots: LocalSnapshots,
    undo_stack: VecDeque<Vec<CanvasElementState>>,
    redo_stack: Vec<Vec<CanvasElementState>>,
    max_history: usize,
}

impl HistoryStore {
    pub fn new(canvas_id: impl Into<String>) -> Self {
        Self::with_capacity(canvas_id, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_capacity(canvas_id: impl Into<String>, max_history: usize) -> Self {
        Self {
            canvas_id: canvas_id.into(),
            elements: Vec::new(),
            snapshots: LocalSnapshots::default(),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_history,
        }
    }

    /// Keep at most `max` mirrored snapshots, evicting the oldest.
    pub fn with_max_snapshots(mut self, max: Option<usize>) -> Self {
        self.snapshots.max = max;
        self
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.order.len()
    }

    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }

    pub fn elements(&self) -> &[CanvasElementState] {
        &self.elements
    }

    /// Apply a locally or remotely originated command.
    pub fn apply_command(&mut self, command: &CanvasCommand) {
        self.apply_command_at(command, Utc::now());
    }

    /// Apply a command using `timestamp` for the element timestamps it writes.
    pub fn apply_command_at(&mut self, command: &CanvasCommand, timestamp: DateTime<Utc>) {
        if command.mutates_elements() {
            let current = self.elements.clone();
            self.push_undo(current);
            self.redo_stack.clear();
        }

        match apply_command(&mut self.elements, &mut self.snapshots, command, timestamp) {
            Ok(_) => {}
            Err(EaselError::NotFound(what)) => {
                // Snapshot taken before this client joined; the server's
                // follow-up state frame carries the restored list.
                debug!(canvas_id = %self.canvas_id, %what, "Restore target not mirrored locally");
            }
            Err(e) => warn!(canvas_id = %self.canvas_id, error = %e, "Failed to apply command"),
        }
    }

    /// Replace the element list with authoritative state. Stacks are untouched.
    pub fn load_state(&mut self, elements: Vec<CanvasElementState>) {
        self.elements = elements;
    }

    /// Feed a server frame. Returns whether it was for this canvas and applied.
    pub fn apply_frame(&mut self, frame: &ServerFrame) -> bool {
        match frame {
            ServerFrame::Command {
                canvas_id,
                command,
                timestamp,
                ..
            } if *canvas_id == self.canvas_id => {
                self.apply_command_at(command, *timestamp);
                true
            }
            ServerFrame::State {
                canvas_id,
                elements,
            } if *canvas_id == self.canvas_id => {
                self.load_state(elements.clone());
                true
            }
            ServerFrame::Command { .. } | ServerFrame::State { .. } | ServerFrame::Error { .. } => {
                false
            }
        }
    }

    /// Step back one mutation. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop_back() {
            Some(previous) => {
                let current = std::mem::replace(&mut self.elements, previous);
                self.redo_stack.push(current);
                true
            }
            None => false,
        }
    }

    /// Re-apply the last undone state. Returns false when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(next) => {
                let current = std::mem::replace(&mut self.elements, next);
                self.push_undo(current);
                true
            }
            None => false,
        }
    }

    /// Clear elements, both stacks and mirrored snapshots.
    pub fn reset(&mut self) {
        self.elements.clear();
        self.snapshots.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    fn push_undo(&mut self, state: Vec<CanvasElementState>) {
        if self.max_history == 0 {
            return;
        }
        self.undo_stack.push_back(state);
        while self.undo_stack.len() > self.max_history {
            self.undo_stack.pop_front();
        }
    }
}
