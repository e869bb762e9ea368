//! Server-authoritative canvas state and its synchronization primitives.
//!
//! Agents mutate an ordered list of UI elements per canvas. The store applies
//! each command, the topic bus fans it out to connected display clients, and
//! client-side history stores replay the same stream to mirror the canvas.

mod apply;
pub mod bus;
pub mod history;
pub mod manager;
pub mod model;
pub mod protocol;
pub mod store;

pub use bus::{topic_matches, BusStats, Envelope, Subscription, TopicBus};
pub use history::HistoryStore;
pub use manager::{CanvasManager, Dispatch};
pub use model::{
    CanvasCommand, CanvasElement, CanvasElementState, CanvasInteraction, CanvasSnapshot,
    SnapshotSummary,
};
pub use protocol::{canvas_topic, AgentFrame, ClientFrame, RoutedInteraction, ServerFrame};
pub use store::CanvasStore;
