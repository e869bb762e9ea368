//! Canvas elements, commands, and interactions.
//!
//! All three are closed, internally tagged sets (`{"type": ...}` on the wire).
//! Optional rendering fields fall back to the defaults declared here, so an
//! agent only has to send what it cares about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Element type names accepted by the command adapter, in declaration order.
pub const ELEMENT_TYPES: [&str; 8] = [
    "text", "button", "input", "image", "code", "table", "form", "chart",
];

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

/// A renderable canvas element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanvasElement {
    Text(TextElement),
    Button(ButtonElement),
    Input(InputElement),
    Image(ImageElement),
    Code(CodeElement),
    Table(TableElement),
    Form(FormElement),
    Chart(ChartElement),
}

impl CanvasElement {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Button(_) => "button",
            Self::Input(_) => "input",
            Self::Image(_) => "image",
            Self::Code(_) => "code",
            Self::Table(_) => "table",
            Self::Form(_) => "form",
            Self::Chart(_) => "chart",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextVariant {
    Heading,
    Subheading,
    #[default]
    Body,
    Caption,
    Muted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    pub content: String,
    #[serde(default)]
    pub variant: TextVariant,
}

/// Button styles. `Secondary` is the neutral default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonVariant {
    Primary,
    #[default]
    Secondary,
    Outline,
    Ghost,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonElement {
    pub label: String,
    #[serde(default)]
    pub variant: ButtonVariant,
    #[serde(default)]
    pub disabled: bool,
    /// Opaque action name echoed back to the agent on click.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    Text,
    Password,
    Email,
    Number,
    Textarea,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub input_type: InputType,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageElement {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

fn default_language() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeElement {
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub show_line_numbers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl TableColumn {
    /// Header text; falls back to the column key.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableElement {
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub selectable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub field_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub placeholder: String,
}

fn default_submit_label() -> String {
    "Submit".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormElement {
    pub fields: Vec<FormField>,
    #[serde(default = "default_submit_label")]
    pub submit_label: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Area,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDatum {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartElement {
    #[serde(default)]
    pub chart_type: ChartType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub data: Vec<ChartDatum>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A mutation issued by the producing agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanvasCommand {
    /// Create the element, or replace it in place if the id already exists.
    Render {
        id: String,
        element: CanvasElement,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class: Option<String>,
    },
    /// Replace the body of an existing element. No-op for unknown ids.
    Update { id: String, element: CanvasElement },
    Remove { id: String },
    /// Clear all elements. Snapshot history is kept.
    Reset,
    /// Capture the current element list. `snapshot_id` is assigned by the
    /// store and is only present on resolved (published) commands.
    Snapshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot_id: Option<String>,
    },
    Restore { snapshot_id: String },
    /// Apply members in order. Not atomic.
    Batch { commands: Vec<CanvasCommand> },
}

impl CanvasCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Render { .. } => "render",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::Reset => "reset",
            Self::Snapshot { .. } => "snapshot",
            Self::Restore { .. } => "restore",
            Self::Batch { .. } => "batch",
        }
    }

    /// Whether applying this command can change the element list.
    pub fn mutates_elements(&self) -> bool {
        match self {
            Self::Snapshot { .. } => false,
            Self::Batch { commands } => commands.iter().any(Self::mutates_elements),
            Self::Render { .. }
            | Self::Update { .. }
            | Self::Remove { .. }
            | Self::Reset
            | Self::Restore { .. } => true,
        }
    }

    /// Whether this command (or any batch member) restores a snapshot.
    pub fn contains_restore(&self) -> bool {
        match self {
            Self::Restore { .. } => true,
            Self::Batch { commands } => commands.iter().any(Self::contains_restore),
            Self::Render { .. }
            | Self::Update { .. }
            | Self::Remove { .. }
            | Self::Reset
            | Self::Snapshot { .. } => false,
        }
    }

    /// Snapshot ids assigned while resolving this command, in order.
    pub fn snapshot_ids(&self) -> Vec<&str> {
        match self {
            Self::Snapshot {
                snapshot_id: Some(id),
                ..
            } => vec![id.as_str()],
            Self::Batch { commands } => commands.iter().flat_map(Self::snapshot_ids).collect(),
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Materialized state
// ---------------------------------------------------------------------------

/// An element as held by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasElementState {
    pub id: String,
    pub element: CanvasElement,
    pub position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable capture of a canvas's element list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    pub id: String,
    pub canvas_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub elements: Vec<CanvasElementState>,
    pub created_at: DateTime<Utc>,
}

impl CanvasSnapshot {
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id.clone(),
            label: self.label.clone(),
            element_count: self.elements.len(),
            created_at: self.created_at,
        }
    }
}

/// Snapshot listing entry without the element payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub element_count: usize,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Interactions
// ---------------------------------------------------------------------------

/// A user action reported by a display client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanvasInteraction {
    Click {
        element_id: String,
    },
    InputSubmit {
        element_id: String,
        value: String,
    },
    FormSubmit {
        element_id: String,
        #[serde(default)]
        values: serde_json::Map<String, serde_json::Value>,
    },
    TableSelect {
        element_id: String,
        row_index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row: Option<serde_json::Value>,
    },
}

impl CanvasInteraction {
    pub fn element_id(&self) -> &str {
        match self {
            Self::Click { element_id }
            | Self::InputSubmit { element_id, .. }
            | Self::FormSubmit { element_id, .. }
            | Self::TableSelect { element_id, .. } => element_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::InputSubmit { .. } => "input_submit",
            Self::FormSubmit { .. } => "form_submit",
            Self::TableSelect { .. } => "table_select",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_button_defaults() {
        let el: CanvasElement =
            serde_json::from_value(json!({"type": "button", "label": "Go"})).unwrap();
        match el {
            CanvasElement::Button(b) => {
                assert_eq!(b.label, "Go");
                assert_eq!(b.variant, ButtonVariant::Secondary);
                assert!(!b.disabled);
                assert!(b.action.is_none());
            }
            other => panic!("expected button, got {other:?}"),
        }
    }

    #[test]
    fn test_table_and_form_defaults() {
        let table: CanvasElement = serde_json::from_value(json!({
            "type": "table",
            "columns": [{"key": "name"}, {"key": "age", "label": "Age"}],
        }))
        .unwrap();
        let CanvasElement::Table(table) = table else {
            panic!("expected table");
        };
        assert!(!table.sortable);
        assert!(!table.selectable);
        assert!(table.rows.is_empty());
        assert_eq!(table.columns[0].display_label(), "name");
        assert_eq!(table.columns[1].display_label(), "Age");

        let form: CanvasElement = serde_json::from_value(json!({
            "type": "form",
            "fields": [{"name": "email", "field_type": "email"}],
        }))
        .unwrap();
        let CanvasElement::Form(form) = form else {
            panic!("expected form");
        };
        assert_eq!(form.submit_label, "Submit");
        assert_eq!(form.fields[0].field_type, InputType::Email);
        assert!(!form.fields[0].required);
    }

    #[test]
    fn test_code_and_chart_defaults() {
        let code: CanvasElement =
            serde_json::from_value(json!({"type": "code", "code": "fn main() {}"})).unwrap();
        assert_eq!(
            code,
            CanvasElement::Code(CodeElement {
                code: "fn main() {}".into(),
                language: "text".into(),
                show_line_numbers: false,
            })
        );

        let chart: CanvasElement = serde_json::from_value(json!({
            "type": "chart",
            "data": [{"label": "a", "value": 1.5}],
        }))
        .unwrap();
        let CanvasElement::Chart(chart) = chart else {
            panic!("expected chart");
        };
        assert_eq!(chart.chart_type, ChartType::Bar);
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let result = serde_json::from_value::<CanvasElement>(json!({"type": "image"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_element_type_rejected() {
        let result = serde_json::from_value::<CanvasElement>(json!({"type": "video", "src": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_type_names_match_wire_tags() {
        let el = CanvasElement::Text(TextElement {
            content: "hi".into(),
            variant: TextVariant::Heading,
        });
        let value = serde_json::to_value(&el).unwrap();
        assert_eq!(value["type"], el.type_name());
        assert!(ELEMENT_TYPES.contains(&el.type_name()));
    }

    #[test]
    fn test_command_wire_shape() {
        let cmd: CanvasCommand = serde_json::from_value(json!({
            "type": "render",
            "id": "btn1",
            "element": {"type": "button", "label": "Go"},
        }))
        .unwrap();
        assert_eq!(cmd.kind(), "render");
        assert!(cmd.mutates_elements());

        let snap: CanvasCommand = serde_json::from_value(json!({"type": "snapshot"})).unwrap();
        assert!(!snap.mutates_elements());
        assert!(serde_json::to_value(&snap).unwrap().get("snapshot_id").is_none());
    }

    #[test]
    fn test_batch_helpers() {
        let batch = CanvasCommand::Batch {
            commands: vec![
                CanvasCommand::Snapshot {
                    label: None,
                    snapshot_id: Some("s1".into()),
                },
                CanvasCommand::Restore {
                    snapshot_id: "s1".into(),
                },
            ],
        };
        assert!(batch.mutates_elements());
        assert!(batch.contains_restore());
        assert_eq!(batch.snapshot_ids(), vec!["s1"]);

        let only_snapshots = CanvasCommand::Batch {
            commands: vec![CanvasCommand::Snapshot {
                label: None,
                snapshot_id: None,
            }],
        };
        assert!(!only_snapshots.mutates_elements());
    }

    #[test]
    fn test_interaction_parse() {
        let i: CanvasInteraction =
            serde_json::from_value(json!({"type": "click", "element_id": "btn1"})).unwrap();
        assert_eq!(i.element_id(), "btn1");
        assert_eq!(i.kind(), "click");

        let i: CanvasInteraction = serde_json::from_value(json!({
            "type": "table_select",
            "element_id": "t1",
            "row_index": 2,
        }))
        .unwrap();
        assert_eq!(i.element_id(), "t1");
    }
}
