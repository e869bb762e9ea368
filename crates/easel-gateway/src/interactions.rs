//! Routing of client interactions to the agent that owns a canvas.
//!
//! Routing is keyed by canvas id, not connection id: several displays may
//! share one canvas and all of them talk to the same agent.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use easel_canvas::RoutedInteraction;
use easel_core::protocol::TOPIC_CANVAS_INTERACTION;

use crate::events::publish_status;
use crate::state::GatewayState;

/// Registry of per-canvas agent inboxes.
#[derive(Default)]
pub struct InteractionRouter {
    routes: RwLock<HashMap<String, mpsc::UnboundedSender<RoutedInteraction>>>,
}

impl InteractionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a canvas. A later registration replaces the earlier one.
    pub fn register(&self, canvas_id: &str) -> mpsc::UnboundedReceiver<RoutedInteraction> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(canvas_id.to_string(), tx);
        if previous.is_some() {
            debug!(canvas_id, "Replaced interaction route");
        }
        rx
    }

    pub fn unregister(&self, canvas_id: &str) -> bool {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(canvas_id)
            .is_some()
    }

    /// Hand an interaction to the owning agent. Returns whether one received it.
    pub fn route(&self, interaction: RoutedInteraction) -> bool {
        let canvas_id = interaction.canvas_id.clone();
        let sent = {
            let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
            match routes.get(&canvas_id) {
                Some(tx) => tx.send(interaction).is_ok(),
                None => false,
            }
        };
        if !sent && self.unregister_closed(&canvas_id) {
            debug!(canvas_id = %canvas_id, "Pruned closed interaction route");
        }
        sent
    }

    pub fn is_registered(&self, canvas_id: &str) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(canvas_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    fn unregister_closed(&self, canvas_id: &str) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.get(canvas_id).is_some_and(|tx| tx.is_closed()) {
            routes.remove(canvas_id);
            return true;
        }
        false
    }
}

/// Route an interaction and mirror it on the status bus.
pub fn dispatch_interaction(state: &GatewayState, interaction: RoutedInteraction) {
    let topic = format!("{TOPIC_CANVAS_INTERACTION}:{}", interaction.canvas_id);
    let payload = match serde_json::to_value(&interaction) {
        Ok(v) => v,
        Err(e) => {
            warn!(%e, "Failed to serialize interaction");
            json!({"canvas_id": &interaction.canvas_id})
        }
    };
    let kind = interaction.interaction.kind();
    let element_id = interaction.interaction.element_id().to_string();
    let canvas_id = interaction.canvas_id.clone();

    let routed = state.interactions.route(interaction);
    publish_status(state, &topic, payload);

    #[cfg(feature = "metrics")]
    crate::metrics::record_interaction(kind, routed);

    if routed {
        debug!(canvas_id = %canvas_id, kind, element_id = %element_id, "Interaction routed");
    } else {
        debug!(canvas_id = %canvas_id, kind, element_id = %element_id, "No agent registered for canvas");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use easel_canvas::CanvasInteraction;

    fn click(canvas_id: &str) -> RoutedInteraction {
        RoutedInteraction {
            canvas_id: canvas_id.into(),
            interaction: CanvasInteraction::Click {
                element_id: "btn1".into(),
            },
            session_id: None,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_route_by_canvas_id() {
        let router = InteractionRouter::new();
        let mut rx = router.register("c1");

        assert!(router.route(click("c1")));
        assert!(!router.route(click("c2")));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.canvas_id, "c1");
        assert_eq!(got.interaction.element_id(), "btn1");
    }

    #[test]
    fn test_closed_route_is_pruned() {
        let router = InteractionRouter::new();
        let rx = router.register("c1");
        assert!(router.is_registered("c1"));
        drop(rx);
        assert!(!router.is_registered("c1"));
        assert!(!router.route(click("c1")));
        assert!(!router.unregister("c1"));
    }

    #[tokio::test]
    async fn test_reregister_replaces() {
        let router = InteractionRouter::new();
        let mut first = router.register("c1");
        let mut second = router.register("c1");
        assert!(router.route(click("c1")));
        assert!(second.recv().await.is_some());
        assert!(first.recv().await.is_none());
    }
}
