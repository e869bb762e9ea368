//! Apply-then-publish coordination for canvas producers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use easel_core::error::Result;

use crate::bus::{Subscription, TopicBus};
use crate::model::{CanvasCommand, CanvasElementState};
use crate::protocol::{canvas_topic, ServerFrame};
use crate::store::CanvasStore;

/// Outcome of a dispatched command.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// The command as applied, with generated snapshot ids filled in.
    pub command: CanvasCommand,
    /// Subscribers that accepted the command frame.
    pub receivers: usize,
    pub timestamp: DateTime<Utc>,
}

/// Owns the shared store and canvas bus.
///
/// Every mutation goes store-first, then bus, under a per-canvas sequencing
/// lock, so the order commands reach the store is the order they are
/// published in.
pub struct CanvasManager {
    store: Arc<CanvasStore>,
    bus: TopicBus<ServerFrame>,
    sequencers: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CanvasManager {
    pub fn new(store: Arc<CanvasStore>, bus: TopicBus<ServerFrame>) -> Self {
        Self {
            store,
            bus,
            sequencers: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<CanvasStore> {
        &self.store
    }

    pub fn bus(&self) -> &TopicBus<ServerFrame> {
        &self.bus
    }

    /// Apply `command` to the store, then publish it on `canvas:{canvas_id}`.
    ///
    /// A command that restores a snapshot is followed by a `state` frame so
    /// clients that never saw the snapshot converge.
    pub async fn execute(
        &self,
        canvas_id: &str,
        agent_id: &str,
        command: CanvasCommand,
    ) -> Result<Dispatch> {
        let sequencer = self.sequencer(canvas_id).await;
        let _turn = sequencer.lock().await;

        let timestamp = Utc::now();
        let resolved = self.store.apply_at(canvas_id, &command, timestamp).await?;

        let topic = canvas_topic(canvas_id);
        let receivers = self.bus.publish(
            &topic,
            ServerFrame::Command {
                canvas_id: canvas_id.to_string(),
                command: resolved.clone(),
                agent_id: agent_id.to_string(),
                timestamp,
            },
        );

        if resolved.contains_restore() {
            let elements = self.store.get_elements(canvas_id).await;
            self.bus.publish(
                &topic,
                ServerFrame::State {
                    canvas_id: canvas_id.to_string(),
                    elements,
                },
            );
        }

        info!(canvas_id, agent_id, kind = resolved.kind(), receivers, "Canvas command dispatched");
        Ok(Dispatch {
            command: resolved,
            receivers,
            timestamp,
        })
    }

    /// Full-state frame for a canvas.
    pub async fn state_frame(&self, canvas_id: &str) -> ServerFrame {
        ServerFrame::State {
            canvas_id: canvas_id.to_string(),
            elements: self.store.get_elements(canvas_id).await,
        }
    }

    pub async fn elements(&self, canvas_id: &str) -> Vec<CanvasElementState> {
        self.store.get_elements(canvas_id).await
    }

    /// Subscribe to one canvas's frames.
    pub fn subscribe(&self, canvas_id: &str) -> Subscription<ServerFrame> {
        debug!(canvas_id, "Canvas subscription opened");
        self.bus.subscribe([canvas_topic(canvas_id)])
    }

    async fn sequencer(&self, canvas_id: &str) -> Arc<Mutex<()>> {
        self.sequencers
            .lock()
            .await
            .entry(canvas_id.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanvasElement, TextElement, TextVariant};

    fn manager() -> CanvasManager {
        CanvasManager::new(Arc::new(CanvasStore::new()), TopicBus::new("canvas", 64))
    }

    fn render(id: &str) -> CanvasCommand {
        CanvasCommand::Render {
            id: id.into(),
            element: CanvasElement::Text(TextElement {
                content: id.into(),
                variant: TextVariant::Body,
            }),
            position: None,
            class: None,
        }
    }

    #[tokio::test]
    async fn test_execute_applies_then_publishes() {
        let manager = manager();
        let mut sub = manager.subscribe("c1");
        let mut other = manager.subscribe("c2");

        let dispatch = manager.execute("c1", "agent-1", render("a")).await.unwrap();
        assert_eq!(dispatch.receivers, 1);
        assert_eq!(manager.elements("c1").await.len(), 1);

        let envelope = sub.recv().await.unwrap();
        let ServerFrame::Command {
            canvas_id,
            command,
            agent_id,
            timestamp,
        } = &envelope.payload
        else {
            panic!("expected command frame");
        };
        assert_eq!(canvas_id, "c1");
        assert_eq!(agent_id, "agent-1");
        assert_eq!(command, &render("a"));
        assert_eq!(*timestamp, dispatch.timestamp);
        assert!(other.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_failed_restore_publishes_nothing() {
        let manager = manager();
        let mut sub = manager.subscribe("c1");
        let result = manager
            .execute(
                "c1",
                "agent",
                CanvasCommand::Restore {
                    snapshot_id: "ghost".into(),
                },
            )
            .await;
        assert!(result.is_err());
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_restore_followed_by_state() {
        let manager = manager();
        manager.execute("c1", "agent", render("a")).await.unwrap();
        let snap = manager
            .execute(
                "c1",
                "agent",
                CanvasCommand::Snapshot {
                    label: None,
                    snapshot_id: None,
                },
            )
            .await
            .unwrap();
        let snapshot_id = snap.command.snapshot_ids()[0].to_string();
        manager.execute("c1", "agent", CanvasCommand::Reset).await.unwrap();

        let mut sub = manager.subscribe("c1");
        manager
            .execute("c1", "agent", CanvasCommand::Restore { snapshot_id })
            .await
            .unwrap();

        let first = sub.recv().await.unwrap();
        assert!(matches!(first.payload, ServerFrame::Command { .. }));
        let second = sub.recv().await.unwrap();
        let ServerFrame::State { elements, .. } = &second.payload else {
            panic!("expected state frame");
        };
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].id, "a");
    }

    #[tokio::test]
    async fn test_publish_order_matches_apply_order() {
        let manager = Arc::new(manager());
        let mut sub = manager.subscribe("c1");

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager.execute("c1", "agent", render(&format!("e{i}"))).await.unwrap();
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        // Auto positions are assigned in apply order; the stream must agree.
        let elements = manager.elements("c1").await;
        for expected in &elements {
            let envelope = sub.recv().await.unwrap();
            let ServerFrame::Command {
                command: CanvasCommand::Render { id, .. },
                ..
            } = &envelope.payload
            else {
                panic!("expected render");
            };
            assert_eq!(id, &expected.id);
        }
    }
}
