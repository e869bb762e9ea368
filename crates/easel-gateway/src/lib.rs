//! Easel gateway: serves live canvases to display clients.
//!
//! Hosts the canvas WebSocket (`/ws/canvas`), the status event bus (`/ws`),
//! the agent surface (`/ws/agent`, `/api/canvas/{id}/commands`), the REST
//! snapshot surface (`/api/canvas`) and health/metrics endpoints.

pub mod agent;
pub mod api;
pub mod canvas;
pub mod events;
pub mod interactions;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod server;
pub mod state;

pub use events::publish_status;
pub use interactions::InteractionRouter;
pub use server::{build_router, start_gateway};
pub use state::GatewayState;
