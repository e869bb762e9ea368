//! Command application shared by the server store and client history mirrors.
//!
//! Both sides run every command through [`apply_command`], so replaying the
//! published stream on a client yields the same element list the server holds.

use chrono::{DateTime, Utc};
use tracing::warn;

use easel_core::error::{EaselError, Result};

use crate::model::{CanvasCommand, CanvasElementState};

/// Where `Snapshot` captures go and where `Restore` looks them up.
pub(crate) trait SnapshotLog {
    /// Record a capture. Returns the id it was stored under.
    fn record(
        &mut self,
        requested_id: Option<&str>,
        label: Option<&str>,
        elements: &[CanvasElementState],
        now: DateTime<Utc>,
    ) -> String;

    fn find(&self, snapshot_id: &str) -> Option<Vec<CanvasElementState>>;
}

/// Apply `command` to `elements`, returning the resolved command.
///
/// Resolution fills in generated snapshot ids. A top-level `Restore` of an
/// unknown snapshot fails with `NotFound`; inside a `Batch` the failing
/// member is logged and skipped.
pub(crate) fn apply_command<L: SnapshotLog>(
    elements: &mut Vec<CanvasElementState>,
    log: &mut L,
    command: &CanvasCommand,
    now: DateTime<Utc>,
) -> Result<CanvasCommand> {
    match command {
        CanvasCommand::Render {
            id,
            element,
            position,
            class,
        } => {
            if let Some(existing) = elements.iter_mut().find(|e| &e.id == id) {
                existing.element = element.clone();
                existing.class = class.clone();
                existing.updated_at = now;
                if let Some(p) = position {
                    existing.position = *p;
                }
            } else {
                let position = position.unwrap_or_else(|| next_position(elements));
                elements.push(CanvasElementState {
                    id: id.clone(),
                    element: element.clone(),
                    position,
                    class: class.clone(),
                    updated_at: now,
                });
            }
            elements.sort_by_key(|e| e.position);
            Ok(command.clone())
        }
        CanvasCommand::Update { id, element } => {
            if let Some(existing) = elements.iter_mut().find(|e| &e.id == id) {
                existing.element = element.clone();
                existing.updated_at = now;
            }
            Ok(command.clone())
        }
        CanvasCommand::Remove { id } => {
            elements.retain(|e| &e.id != id);
            Ok(command.clone())
        }
        CanvasCommand::Reset => {
            elements.clear();
            Ok(command.clone())
        }
        CanvasCommand::Snapshot { label, snapshot_id } => {
            let id = log.record(snapshot_id.as_deref(), label.as_deref(), elements, now);
            Ok(CanvasCommand::Snapshot {
                label: label.clone(),
                snapshot_id: Some(id),
            })
        }
        CanvasCommand::Restore { snapshot_id } => {
            let restored = log
                .find(snapshot_id)
                .ok_or_else(|| EaselError::NotFound(format!("snapshot '{snapshot_id}'")))?;
            *elements = restored;
            Ok(command.clone())
        }
        CanvasCommand::Batch { commands } => {
            let mut resolved = Vec::with_capacity(commands.len());
            for member in commands {
                match apply_command(elements, log, member, now) {
                    Ok(r) => resolved.push(r),
                    Err(e) => {
                        warn!(kind = member.kind(), error = %e, "Skipping failed batch member");
                        resolved.push(member.clone());
                    }
                }
            }
            Ok(CanvasCommand::Batch { commands: resolved })
        }
    }
}

/// Position for an appended element: one past the current maximum.
fn next_position(elements: &[CanvasElementState]) -> i64 {
    elements.iter().map(|e| e.position).max().map_or(0, |max| max.saturating_add(1))
}
