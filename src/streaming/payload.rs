use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator of the nested envelope shape
pub const NODE_CHUNK: &str = "NodeChunk";

pub const NODE_STREAM: &str = "STREAM";
pub const NODE_SEARCH_STEPS: &str = "SEARCH_STEPS";
pub const NODE_SEARCH_PROGRESS: &str = "SEARCH_PROGRESS";

/// Raw envelope as found in an event's `data`
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    content: Value,
}

/// Inner object of a `NodeChunk` envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeChunk {
    node_name: Option<String>,
    #[serde(default)]
    content: Value,
}

/// Envelope normalized to a node name and its content
#[derive(Debug, Clone, PartialEq)]
pub struct NodePayload {
    pub node_name: String,
    pub content: Value,
}

/// One step of the search progress list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStep {
    #[serde(default, deserialize_with = "lenient_text")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_completed: bool,
    #[serde(
        default,
        alias = "info",
        deserialize_with = "lenient_info",
        skip_serializing_if = "Option::is_none"
    )]
    pub extra_info: Option<String>,
}

/// Typed view of a payload, routed by node name
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Text delta for the content assembler
    Stream(String),
    /// Full replacement of the step list, already normalized
    SearchSteps(Vec<SearchStep>),
    /// Replacement progress value; `None` clears it
    SearchProgress(Option<f64>),
    /// Known or unknown node that carries nothing for us
    Ignored(String),
}

impl NodePayload {
    /// Decode and normalize the JSON carried by one event.
    ///
    /// Accepts both `{"type":"NodeChunk","content":{"nodeName":..,"content":..}}`
    /// and the flat `{"type":..,"content":..}` form.
    pub fn parse(data: &str) -> crate::Result<Option<Self>> {
        let envelope: Envelope = serde_json::from_str(data)?;

        if envelope.kind.as_deref() == Some(NODE_CHUNK) {
            let chunk: NodeChunk = serde_json::from_value(envelope.content)?;
            return Ok(chunk.node_name.map(|node_name| Self {
                node_name,
                content: chunk.content,
            }));
        }

        Ok(envelope.kind.map(|node_name| Self {
            node_name,
            content: envelope.content,
        }))
    }

    /// Route the payload to a typed node
    pub fn into_node(self) -> Node {
        match (self.node_name.as_str(), self.content) {
            (NODE_STREAM, Value::String(delta)) => Node::Stream(delta),
            (NODE_SEARCH_STEPS, Value::Array(items)) => Node::SearchSteps(normalize_steps(items)),
            (NODE_SEARCH_PROGRESS, content) => Node::SearchProgress(progress_value(&content)),
            _ => Node::Ignored(self.node_name.clone()),
        }
    }
}

/// Normalize the active/completed flags of a raw step list.
///
/// When some step is explicitly active, the first such step is the active one
/// and exactly the steps before it are completed. Without an explicit active
/// step, no step is active and completion flags are kept as sent.
pub fn normalize_steps(items: Vec<Value>) -> Vec<SearchStep> {
    let mut steps: Vec<SearchStep> = items
        .into_iter()
        .map(|item| serde_json::from_value(item).unwrap_or_default())
        .collect();

    if let Some(active) = steps.iter().position(|s| s.is_active) {
        for (i, step) in steps.iter_mut().enumerate() {
            step.is_active = i == active;
            step.is_completed = i < active;
        }
    }

    steps
}

fn progress_value(content: &Value) -> Option<f64> {
    content
        .as_f64()
        .or_else(|| content.get("percent").and_then(Value::as_f64))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Truthiness of a loosely typed flag: null, zero and empty strings are false
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn lenient_info<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(data: &str) -> Option<Node> {
        NodePayload::parse(data).unwrap().map(NodePayload::into_node)
    }

    #[test]
    fn test_nested_envelope() {
        let data = r#"{"type":"NodeChunk","content":{"nodeName":"STREAM","content":"hi"}}"#;
        assert_eq!(node(data), Some(Node::Stream("hi".to_string())));
    }

    #[test]
    fn test_flat_envelope() {
        let data = r#"{"type":"SEARCH_PROGRESS","content":{"percent":42.5}}"#;
        assert_eq!(node(data), Some(Node::SearchProgress(Some(42.5))));
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(NodePayload::parse("{not json").is_err());
    }

    #[test]
    fn test_missing_node_name() {
        assert_eq!(node(r#"{"type":"NodeChunk","content":{}}"#), None);
        assert_eq!(node(r#"{"content":"x"}"#), None);
    }

    #[test]
    fn test_unknown_and_mistyped_nodes_ignored() {
        assert_eq!(
            node(r#"{"type":"CITATIONS","content":[]}"#),
            Some(Node::Ignored("CITATIONS".to_string()))
        );
        assert_eq!(
            node(r#"{"type":"STREAM","content":42}"#),
            Some(Node::Ignored("STREAM".to_string()))
        );
    }

    #[test]
    fn test_progress_shapes() {
        assert_eq!(progress_value(&json!(10)), Some(10.0));
        assert_eq!(progress_value(&json!({"percent": 55})), Some(55.0));
        assert_eq!(progress_value(&json!("55")), None);
    }

    #[test]
    fn test_normalize_steps_explicit_active() {
        let steps = normalize_steps(vec![
            json!({"text": "search"}),
            json!({"text": "summarize", "isActive": true}),
            json!({"text": "done", "isCompleted": true}),
        ]);

        let flags: Vec<_> = steps.iter().map(|s| (s.is_active, s.is_completed)).collect();
        assert_eq!(flags, vec![(false, true), (true, false), (false, false)]);
    }

    #[test]
    fn test_normalize_steps_without_active() {
        let steps = normalize_steps(vec![
            json!({"text": "a", "isCompleted": true}),
            json!({"text": "b"}),
        ]);

        assert!(steps.iter().all(|s| !s.is_active));
        assert!(steps[0].is_completed);
        assert!(!steps[1].is_completed);
    }

    #[test]
    fn test_step_info_alias_and_lenient_fields() {
        let steps = normalize_steps(vec![
            json!({"text": 3, "info": "3 sources"}),
            json!({"extraInfo": ""}),
            json!("not an object"),
        ]);

        assert_eq!(steps[0].text, "3");
        assert_eq!(steps[0].extra_info.as_deref(), Some("3 sources"));
        assert_eq!(steps[1].text, "");
        assert_eq!(steps[1].extra_info, None);
        assert_eq!(steps[2], SearchStep::default());
    }

    #[test]
    fn test_loosely_typed_flags_keep_step() {
        let steps = normalize_steps(vec![
            json!({"text": "search", "isActive": null, "isCompleted": null, "info": "2 hits"}),
            json!({"text": "summarize", "isActive": 1}),
            json!({"text": "answer", "isActive": "yes"}),
        ]);

        let texts: Vec<_> = steps.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["search", "summarize", "answer"]);
        assert_eq!(steps[0].extra_info.as_deref(), Some("2 hits"));

        let flags: Vec<_> = steps.iter().map(|s| (s.is_active, s.is_completed)).collect();
        assert_eq!(flags, vec![(false, true), (true, false), (false, false)]);
    }

    #[test]
    fn test_loosely_typed_flags_without_active() {
        let steps = normalize_steps(vec![
            json!({"text": "a", "isActive": 0, "isCompleted": 1}),
            json!({"text": "b", "isActive": "", "isCompleted": 0}),
        ]);

        assert_eq!(steps[0].text, "a");
        assert_eq!(steps[1].text, "b");
        assert!(steps.iter().all(|s| !s.is_active));
        assert!(steps[0].is_completed);
        assert!(!steps[1].is_completed);
    }
}
