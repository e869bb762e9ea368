//! Canvas tool — lets the agent render, update, remove, reset, snapshot, and restore
//! elements on a canvas that connected display clients mirror live.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use easel_canvas::model::ELEMENT_TYPES;
use easel_canvas::{CanvasCommand, CanvasElement, CanvasManager};
use easel_core::error::{EaselError, Result};

use crate::{Tool, ToolContext, ToolOutput};

const COMMANDS: [&str; 7] = [
    "render", "update", "remove", "reset", "snapshot", "restore", "batch",
];

/// Raw argument object as sent by the agent.
#[derive(Debug, Deserialize)]
struct CanvasArgs {
    command: String,
    #[serde(default)]
    canvas_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    element_type: Option<String>,
    #[serde(default)]
    props: Option<serde_json::Value>,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    snapshot_id: Option<String>,
    #[serde(default)]
    commands: Vec<serde_json::Value>,
}

/// Tool for driving a canvas from an agent.
pub struct CanvasTool {
    manager: Arc<CanvasManager>,
}

impl CanvasTool {
    pub fn new(manager: Arc<CanvasManager>) -> Self {
        Self { manager }
    }
}

/// Validate an argument object and build the typed command it describes.
///
/// Unknown command kinds, unknown element types, and missing required
/// fields are `Validation` errors.
pub fn parse_command(params: &serde_json::Value) -> Result<CanvasCommand> {
    let args: CanvasArgs = serde_json::from_value(params.clone())
        .map_err(|e| EaselError::Validation(format!("invalid canvas arguments: {e}")))?;
    build_command(args)
}

fn build_command(args: CanvasArgs) -> Result<CanvasCommand> {
    match args.command.as_str() {
        "render" => Ok(CanvasCommand::Render {
            id: require(args.id, "id", "render")?,
            element: build_element(args.element_type.as_deref(), args.props)?,
            position: args.position,
            class: args.class,
        }),
        "update" => Ok(CanvasCommand::Update {
            id: require(args.id, "id", "update")?,
            element: build_element(args.element_type.as_deref(), args.props)?,
        }),
        "remove" => Ok(CanvasCommand::Remove {
            id: require(args.id, "id", "remove")?,
        }),
        "reset" => Ok(CanvasCommand::Reset),
        "snapshot" => Ok(CanvasCommand::Snapshot {
            label: args.label,
            snapshot_id: None,
        }),
        "restore" => Ok(CanvasCommand::Restore {
            snapshot_id: require(args.snapshot_id, "snapshot_id", "restore")?,
        }),
        "batch" => {
            if args.commands.is_empty() {
                return Err(EaselError::Validation(
                    "batch requires at least one command".into(),
                ));
            }
            let commands = args
                .commands
                .iter()
                .enumerate()
                .map(|(i, member)| {
                    parse_command(member).map_err(|e| match e {
                        EaselError::Validation(msg) => {
                            EaselError::Validation(format!("batch member {i}: {msg}"))
                        }
                        other => other,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(CanvasCommand::Batch { commands })
        }
        other => Err(EaselError::Validation(format!(
            "unknown command '{other}'; expected one of: {}",
            COMMANDS.join(", ")
        ))),
    }
}

fn require(value: Option<String>, field: &str, command: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(EaselError::Validation(format!(
            "'{field}' is required for {command}"
        ))),
    }
}

fn build_element(
    element_type: Option<&str>,
    props: Option<serde_json::Value>,
) -> Result<CanvasElement> {
    let element_type = element_type
        .ok_or_else(|| EaselError::Validation("'element_type' is required".into()))?;
    if !ELEMENT_TYPES.contains(&element_type) {
        return Err(EaselError::Validation(format!(
            "unknown element type '{element_type}'; expected one of: {}",
            ELEMENT_TYPES.join(", ")
        )));
    }

    let mut body = match props {
        None | Some(serde_json::Value::Null) => serde_json::Map::new(),
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => {
            return Err(EaselError::Validation("'props' must be an object".into()));
        }
    };
    body.insert("type".into(), json!(element_type));

    serde_json::from_value(serde_json::Value::Object(body))
        .map_err(|e| EaselError::Validation(format!("invalid {element_type} element: {e}")))
}

fn error_output(error: &EaselError) -> ToolOutput {
    ToolOutput {
        content: json!({
            "success": false,
            "error": error.to_string(),
            "code": error.code(),
        })
        .to_string(),
        is_error: true,
    }
}

#[async_trait]
impl Tool for CanvasTool {
    fn name(&self) -> &str {
        "canvas"
    }

    fn description(&self) -> &str {
        "Drive the live canvas shown to the user. Commands: render (create or replace an element), \
         update (replace an existing element's content), remove, reset (clear all elements), \
         snapshot (save the current elements), restore (return to a snapshot), batch (several commands in order). \
         Element ids are chosen by you and must be unique within the canvas."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": COMMANDS,
                    "description": "The canvas command to perform"
                },
                "canvas_id": {
                    "type": "string",
                    "description": "Target canvas (defaults to the current session)"
                },
                "id": {
                    "type": "string",
                    "description": "Element id (render, update, remove)"
                },
                "element_type": {
                    "type": "string",
                    "enum": ELEMENT_TYPES,
                    "description": "Element type (render, update)"
                },
                "props": {
                    "type": "object",
                    "description": "Element properties, e.g. {\"label\": \"Go\"} for a button"
                },
                "position": {
                    "type": "integer",
                    "description": "Render order; omitted means after the last element"
                },
                "class": {
                    "type": "string",
                    "description": "Optional style class (render)"
                },
                "label": {
                    "type": "string",
                    "description": "Snapshot label (snapshot)"
                },
                "snapshot_id": {
                    "type": "string",
                    "description": "Snapshot to restore (restore)"
                },
                "commands": {
                    "type": "array",
                    "items": { "type": "object" },
                    "description": "Commands to apply in order (batch)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        let canvas_id = params
            .get("canvas_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(&context.session_key)
            .to_string();

        let command = match parse_command(&params) {
            Ok(c) => c,
            Err(e) => {
                debug!(%canvas_id, error = %e, "Rejected canvas command");
                return Ok(error_output(&e));
            }
        };

        match self
            .manager
            .execute(&canvas_id, &context.agent_id, command)
            .await
        {
            Ok(dispatch) => Ok(ToolOutput {
                content: json!({
                    "success": true,
                    "canvas_id": canvas_id,
                    "command": dispatch.command,
                    "receivers": dispatch.receivers,
                })
                .to_string(),
                is_error: false,
            }),
            Err(e) => {
                warn!(%canvas_id, error = %e, "Canvas command failed");
                Ok(error_output(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_canvas::model::{ButtonVariant, CanvasElement};
    use easel_canvas::{CanvasStore, ServerFrame, TopicBus};
    use easel_core::config::Config;

    fn setup() -> (CanvasTool, Arc<CanvasManager>, ToolContext) {
        let manager = Arc::new(CanvasManager::new(
            Arc::new(CanvasStore::new()),
            TopicBus::new("canvas", 16),
        ));
        let context = ToolContext {
            session_key: "session-1".into(),
            agent_id: "agent-1".into(),
            config: Arc::new(Config::default()),
        };
        (CanvasTool::new(manager.clone()), manager, context)
    }

    fn output_json(output: &ToolOutput) -> serde_json::Value {
        serde_json::from_str(&output.content).unwrap()
    }

    #[test]
    fn test_canvas_schema() {
        let (tool, _, _) = setup();
        assert_eq!(tool.name(), "canvas");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"][0], "command");
        assert_eq!(schema["properties"]["element_type"]["enum"][1], "button");
    }

    #[test]
    fn test_parse_render_with_defaults() {
        let cmd = parse_command(&json!({
            "command": "render",
            "id": "btn1",
            "element_type": "button",
            "props": {"label": "Go"},
        }))
        .unwrap();
        let CanvasCommand::Render {
            id,
            element: CanvasElement::Button(button),
            position,
            class,
        } = cmd
        else {
            panic!("expected button render");
        };
        assert_eq!(id, "btn1");
        assert_eq!(button.variant, ButtonVariant::Secondary);
        assert!(position.is_none());
        assert!(class.is_none());
    }

    #[test]
    fn test_parse_table_sortable_defaults_false() {
        let cmd = parse_command(&json!({
            "command": "render",
            "id": "t",
            "element_type": "table",
            "props": {"columns": [{"key": "a"}]},
        }))
        .unwrap();
        let CanvasCommand::Render {
            element: CanvasElement::Table(table),
            ..
        } = cmd
        else {
            panic!("expected table render");
        };
        assert!(!table.sortable);
    }

    #[test]
    fn test_unknown_command_is_validation_error() {
        let err = parse_command(&json!({"command": "explode"})).unwrap_err();
        assert!(matches!(err, EaselError::Validation(ref m) if m.contains("explode")));
    }

    #[test]
    fn test_unknown_element_type_is_validation_error() {
        let err = parse_command(&json!({
            "command": "render",
            "id": "v",
            "element_type": "video",
        }))
        .unwrap_err();
        assert!(matches!(err, EaselError::Validation(ref m) if m.contains("video")));
    }

    #[test]
    fn test_missing_fields_are_validation_errors() {
        for params in [
            json!({"command": "render", "element_type": "button", "props": {"label": "x"}}),
            json!({"command": "render", "id": "b", "element_type": "button"}),
            json!({"command": "render", "id": "b", "element_type": "button", "props": 3}),
            json!({"command": "restore"}),
            json!({"command": "batch", "commands": []}),
            json!({"id": "no-command"}),
        ] {
            let err = parse_command(&params).unwrap_err();
            assert!(matches!(err, EaselError::Validation(_)), "{params}");
        }
    }

    #[test]
    fn test_batch_member_errors_name_index() {
        let err = parse_command(&json!({
            "command": "batch",
            "commands": [{"command": "reset"}, {"command": "nope"}],
        }))
        .unwrap_err();
        assert!(matches!(err, EaselError::Validation(ref m) if m.starts_with("batch member 1")));
    }

    #[tokio::test]
    async fn test_execute_render_publishes() {
        let (tool, manager, context) = setup();
        let mut sub = manager.subscribe("session-1");

        let output = tool
            .execute(
                json!({
                    "command": "render",
                    "id": "btn1",
                    "element_type": "button",
                    "props": {"label": "Go"},
                }),
                &context,
            )
            .await
            .unwrap();

        assert!(!output.is_error);
        let body = output_json(&output);
        assert_eq!(body["success"], true);
        assert_eq!(body["receivers"], 1);
        assert_eq!(body["command"]["type"], "render");

        let elements = manager.elements("session-1").await;
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].id, "btn1");

        let envelope = sub.recv().await.unwrap();
        let ServerFrame::Command { agent_id, .. } = &envelope.payload else {
            panic!("expected command frame");
        };
        assert_eq!(agent_id, "agent-1");
    }

    #[tokio::test]
    async fn test_execute_explicit_canvas_id() {
        let (tool, manager, context) = setup();
        tool.execute(
            json!({"command": "render", "canvas_id": "other", "id": "x",
                   "element_type": "text", "props": {"content": "hi"}}),
            &context,
        )
        .await
        .unwrap();
        assert_eq!(manager.elements("other").await.len(), 1);
        assert!(manager.elements("session-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_execute_validation_error_changes_nothing() {
        let (tool, manager, context) = setup();
        let output = tool
            .execute(
                json!({"command": "render", "id": "v", "element_type": "video"}),
                &context,
            )
            .await
            .unwrap();
        assert!(output.is_error);
        assert_eq!(output_json(&output)["code"], "validation_error");
        assert!(manager.store().canvas_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_execute_restore_unknown_reports_not_found() {
        let (tool, _, context) = setup();
        let output = tool
            .execute(json!({"command": "restore", "snapshot_id": "ghost"}), &context)
            .await
            .unwrap();
        assert!(output.is_error);
        assert_eq!(output_json(&output)["code"], "not_found");
    }

    #[tokio::test]
    async fn test_execute_snapshot_returns_id() {
        let (tool, _, context) = setup();
        let output = tool
            .execute(json!({"command": "snapshot", "label": "v1"}), &context)
            .await
            .unwrap();
        let body = output_json(&output);
        assert!(body["command"]["snapshot_id"].is_string());
        assert_eq!(body["command"]["label"], "v1");
    }
}
