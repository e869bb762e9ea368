//! Authoritative per-canvas element lists and snapshot history.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use easel_core::error::Result;

use crate::apply::{apply_command, SnapshotLog};
use crate::model::{CanvasCommand, CanvasElementState, CanvasSnapshot, SnapshotSummary};

/// Server-side canvas registry.
///
/// Canvases are created by their first command. Queries against an unknown
/// canvas return empty results rather than errors.
#[derive(Default)]
pub struct CanvasStore {
    canvases: RwLock<HashMap<String, Arc<RwLock<CanvasState>>>>,
    max_snapshots: Option<usize>,
}

#[derive(Default)]
struct CanvasState {
    elements: Vec<CanvasElementState>,
    snapshots: Vec<CanvasSnapshot>,
}

/// Snapshot history of one canvas, seen through the shared apply logic.
struct History<'a> {
    canvas_id: &'a str,
    snapshots: &'a mut Vec<CanvasSnapshot>,
    max_snapshots: Option<usize>,
}

impl SnapshotLog for History<'_> {
    fn record(
        &mut self,
        _requested_id: Option<&str>,
        label: Option<&str>,
        elements: &[CanvasElementState],
        now: DateTime<Utc>,
    ) -> String {
        // Server ids are always fresh, whatever the caller sent.
        let id = Uuid::new_v4().to_string();
        self.snapshots.push(CanvasSnapshot {
            id: id.clone(),
            canvas_id: self.canvas_id.to_string(),
            label: label.map(str::to_string),
            elements: elements.to_vec(),
            created_at: now,
        });

        if let Some(max) = self.max_snapshots {
            let excess = self.snapshots.len().saturating_sub(max);
            if excess > 0 {
                self.snapshots.drain(..excess);
                debug!(canvas_id = self.canvas_id, evicted = excess, "Evicted old snapshots");
            }
        }
        id
    }

    fn find(&self, snapshot_id: &str) -> Option<Vec<CanvasElementState>> {
        self.snapshots
            .iter()
            .find(|s| s.id == snapshot_id)
            .map(|s| s.elements.clone())
    }
}

impl CanvasStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max` snapshots per canvas, evicting the oldest.
    pub fn with_max_snapshots(mut self, max: Option<usize>) -> Self {
        self.max_snapshots = max;
        self
    }

    /// Apply a command, returning it with generated snapshot ids filled in.
    pub async fn apply(&self, canvas_id: &str, command: &CanvasCommand) -> Result<CanvasCommand> {
        self.apply_at(canvas_id, command, Utc::now()).await
    }

    /// Apply a command using `now` for every timestamp it writes.
    ///
    /// A canvas is only registered once a command against it succeeds.
    pub async fn apply_at(
        &self,
        canvas_id: &str,
        command: &CanvasCommand,
        now: DateTime<Utc>,
    ) -> Result<CanvasCommand> {
        if let Some(canvas) = self.canvas(canvas_id).await {
            let mut guard = canvas.write().await;
            return self.apply_to(canvas_id, &mut guard, command, now);
        }

        let mut canvases = self.canvases.write().await;
        if let Some(canvas) = canvases.get(canvas_id).cloned() {
            drop(canvases);
            let mut guard = canvas.write().await;
            return self.apply_to(canvas_id, &mut guard, command, now);
        }

        let mut fresh = CanvasState::default();
        let resolved = self.apply_to(canvas_id, &mut fresh, command, now)?;
        canvases.insert(canvas_id.to_string(), Arc::new(RwLock::new(fresh)));
        info!(canvas_id, "Canvas created");
        Ok(resolved)
    }

    fn apply_to(
        &self,
        canvas_id: &str,
        state: &mut CanvasState,
        command: &CanvasCommand,
        now: DateTime<Utc>,
    ) -> Result<CanvasCommand> {
        let CanvasState {
            elements,
            snapshots,
        } = state;

        let mut history = History {
            canvas_id,
            snapshots,
            max_snapshots: self.max_snapshots,
        };
        let resolved = apply_command(elements, &mut history, command, now)?;
        debug!(
            canvas_id,
            kind = command.kind(),
            elements = elements.len(),
            "Applied canvas command"
        );
        Ok(resolved)
    }

    /// Current elements in render order.
    pub async fn get_elements(&self, canvas_id: &str) -> Vec<CanvasElementState> {
        match self.canvas(canvas_id).await {
            Some(canvas) => canvas.read().await.elements.clone(),
            None => Vec::new(),
        }
    }

    /// Snapshot summaries, oldest first.
    pub async fn get_snapshots(&self, canvas_id: &str) -> Vec<SnapshotSummary> {
        match self.canvas(canvas_id).await {
            Some(canvas) => canvas
                .read()
                .await
                .snapshots
                .iter()
                .map(CanvasSnapshot::summary)
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn get_snapshot(&self, canvas_id: &str, snapshot_id: &str) -> Option<CanvasSnapshot> {
        let canvas = self.canvas(canvas_id).await?;
        let guard = canvas.read().await;
        guard.snapshots.iter().find(|s| s.id == snapshot_id).cloned()
    }

    /// Ids of every canvas that has received a command, sorted.
    pub async fn canvas_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.canvases.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn canvas(&self, canvas_id: &str) -> Option<Arc<RwLock<CanvasState>>> {
        self.canvases.read().await.get(canvas_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ButtonElement, ButtonVariant, CanvasElement};
    use easel_core::error::EaselError;

    fn button(label: &str) -> CanvasElement {
        CanvasElement::Button(ButtonElement {
            label: label.into(),
            variant: ButtonVariant::default(),
            disabled: false,
            action: None,
        })
    }

    fn render(id: &str, position: Option<i64>) -> CanvasCommand {
        CanvasCommand::Render {
            id: id.into(),
            element: button(id),
            position,
            class: None,
        }
    }

    fn snapshot(label: Option<&str>) -> CanvasCommand {
        CanvasCommand::Snapshot {
            label: label.map(str::to_string),
            snapshot_id: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_canvas_is_empty() {
        let store = CanvasStore::new();
        assert!(store.get_elements("nope").await.is_empty());
        assert!(store.get_snapshots("nope").await.is_empty());
        assert!(store.get_snapshot("nope", "s").await.is_none());
        assert!(store.canvas_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_first_command_creates_canvas() {
        let store = CanvasStore::new();
        store.apply("c1", &render("btn1", None)).await.unwrap();
        assert_eq!(store.canvas_ids().await, vec!["c1".to_string()]);
        assert_eq!(store.get_elements("c1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_then_auto_position() {
        let store = CanvasStore::new();
        store.apply("c", &render("first", Some(7))).await.unwrap();
        store.apply("c", &render("second", None)).await.unwrap();

        let elements = store.get_elements("c").await;
        assert_eq!(elements[0].id, "first");
        assert_eq!(elements[1].id, "second");
        assert!(elements[1].position > elements[0].position);
    }

    #[tokio::test]
    async fn test_update_missing_does_not_create() {
        let store = CanvasStore::new();
        store
            .apply(
                "c",
                &CanvasCommand::Update {
                    id: "missing".into(),
                    element: button("x"),
                },
            )
            .await
            .unwrap();
        assert!(store.get_elements("c").await.iter().all(|e| e.id != "missing"));
    }

    #[tokio::test]
    async fn test_snapshot_reset_restore() {
        let store = CanvasStore::new();
        store.apply("c", &render("a", None)).await.unwrap();
        store.apply("c", &render("b", Some(3))).await.unwrap();

        let resolved = store.apply("c", &snapshot(Some("checkpoint"))).await.unwrap();
        let snapshot_id = resolved.snapshot_ids()[0].to_string();
        let before = store.get_elements("c").await;

        store.apply("c", &CanvasCommand::Reset).await.unwrap();
        assert!(store.get_elements("c").await.is_empty());
        assert_eq!(store.get_snapshots("c").await.len(), 1);

        store
            .apply("c", &CanvasCommand::Restore { snapshot_id })
            .await
            .unwrap();
        assert_eq!(store.get_elements("c").await, before);
    }

    #[tokio::test]
    async fn test_restore_unknown_snapshot_fails() {
        let store = CanvasStore::new();
        store.apply("c", &render("a", None)).await.unwrap();
        let err = store
            .apply(
                "c",
                &CanvasCommand::Restore {
                    snapshot_id: "ghost".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EaselError::NotFound(_)));
        assert_eq!(store.get_elements("c").await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_restore_does_not_create_canvas() {
        let store = CanvasStore::new();
        let err = store
            .apply(
                "fresh",
                &CanvasCommand::Restore {
                    snapshot_id: "ghost".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EaselError::NotFound(_)));
        assert!(store.canvas_ids().await.is_empty());

        store.apply("fresh", &render("a", None)).await.unwrap();
        assert_eq!(store.canvas_ids().await, vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_ids_are_distinct() {
        let store = CanvasStore::new();
        store.apply("c", &render("a", None)).await.unwrap();
        let first = store.apply("c", &snapshot(None)).await.unwrap();
        let second = store.apply("c", &snapshot(None)).await.unwrap();
        assert_ne!(first.snapshot_ids(), second.snapshot_ids());

        let summaries = store.get_snapshots("c").await;
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.element_count == 1));
    }

    #[tokio::test]
    async fn test_caller_snapshot_id_is_ignored() {
        let store = CanvasStore::new();
        let resolved = store
            .apply(
                "c",
                &CanvasCommand::Snapshot {
                    label: None,
                    snapshot_id: Some("mine".into()),
                },
            )
            .await
            .unwrap();
        assert_ne!(resolved.snapshot_ids(), vec!["mine"]);
    }

    #[tokio::test]
    async fn test_snapshot_retention() {
        let store = CanvasStore::new().with_max_snapshots(Some(2));
        let mut ids = Vec::new();
        for _ in 0..3 {
            let resolved = store.apply("c", &snapshot(None)).await.unwrap();
            ids.push(resolved.snapshot_ids()[0].to_string());
        }
        let kept: Vec<String> = store
            .get_snapshots("c")
            .await
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(kept, ids[1..].to_vec());
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writer() {
        let store = Arc::new(CanvasStore::new());
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    store.apply("c", &render(&format!("e{i}"), None)).await.unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let elements = store.get_elements("c").await;
                        assert!(elements.windows(2).all(|w| w[0].position <= w[1].position));
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
        assert_eq!(store.get_elements("c").await.len(), 100);
    }
}
