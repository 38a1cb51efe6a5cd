//! Commit message schema.
//!
//! A complete [`CommitMessage`] is what a generation resolves to. While the
//! model is still streaming, the object seen so far is a
//! [`PartialCommitMessage`] in which any field may be missing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ai::OutputSchema;

/// One line of the commit body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitBodyItem {
    /// Gitmoji for this change.
    pub emoji: String,
    /// Change type (feat, fix, ...).
    #[serde(rename = "type")]
    pub commit_type: String,
    /// Optional scope.
    #[serde(default)]
    pub scope: Option<String>,
    /// Short description of this change.
    pub description: String,
}

/// A complete structured commit message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
    /// Gitmoji representing the change.
    pub emoji: String,
    /// Change type (feat, fix, ...).
    #[serde(rename = "type")]
    pub commit_type: String,
    /// Optional scope.
    #[serde(default)]
    pub scope: Option<String>,
    /// Imperative description, 74 characters or fewer by convention.
    pub description: String,
    /// Optional additional details.
    #[serde(default)]
    pub body: Option<Vec<CommitBodyItem>>,
}

/// A body item as seen mid-stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialBodyItem {
    /// Gitmoji, if emitted yet.
    pub emoji: Option<String>,
    /// Change type, if emitted yet.
    #[serde(rename = "type")]
    pub commit_type: Option<String>,
    /// Scope, if emitted yet.
    pub scope: Option<String>,
    /// Description, if emitted yet.
    pub description: Option<String>,
}

/// A commit message as seen mid-stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialCommitMessage {
    /// Gitmoji, if emitted yet.
    pub emoji: Option<String>,
    /// Change type, if emitted yet.
    #[serde(rename = "type")]
    pub commit_type: Option<String>,
    /// Scope, if emitted yet.
    pub scope: Option<String>,
    /// Description, if emitted yet.
    pub description: Option<String>,
    /// Body items, if emitted yet.
    pub body: Option<Vec<PartialBodyItem>>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn take_if_present(current: &mut Option<String>, incoming: Option<String>) {
    if present(&incoming) {
        *current = incoming;
    }
}

impl PartialCommitMessage {
    /// Reads a partial message out of a (possibly incomplete) JSON value.
    ///
    /// Returns `None` if the value is not an object of the expected shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Merges a newer chunk: a field is replaced only when the chunk carries a
    /// non-empty value for it, so populated fields never revert to empty.
    pub fn merge(&mut self, chunk: PartialCommitMessage) {
        take_if_present(&mut self.emoji, chunk.emoji);
        take_if_present(&mut self.commit_type, chunk.commit_type);
        take_if_present(&mut self.scope, chunk.scope);
        take_if_present(&mut self.description, chunk.description);
        if chunk.body.as_ref().is_some_and(|b| !b.is_empty()) {
            self.body = chunk.body;
        }
    }

    /// Returns true once emoji, type and description are all non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        present(&self.emoji) && present(&self.commit_type) && present(&self.description)
    }

    /// Converts to a complete message, or `None` if a required field is missing.
    ///
    /// Body items lacking a required field are dropped.
    #[must_use]
    pub fn into_complete(self) -> Option<CommitMessage> {
        if !self.is_complete() {
            return None;
        }
        let body = self.body.map(|items| {
            items
                .into_iter()
                .filter_map(|item| {
                    Some(CommitBodyItem {
                        emoji: item.emoji.filter(|v| !v.is_empty())?,
                        commit_type: item.commit_type.filter(|v| !v.is_empty())?,
                        scope: item.scope.filter(|v| !v.is_empty()),
                        description: item.description.filter(|v| !v.is_empty())?,
                    })
                })
                .collect()
        });
        Some(CommitMessage {
            emoji: self.emoji?,
            commit_type: self.commit_type?,
            scope: self.scope.filter(|v| !v.is_empty()),
            description: self.description?,
            body,
        })
    }
}

impl From<&CommitBodyItem> for PartialBodyItem {
    fn from(item: &CommitBodyItem) -> Self {
        Self {
            emoji: Some(item.emoji.clone()),
            commit_type: Some(item.commit_type.clone()),
            scope: item.scope.clone(),
            description: Some(item.description.clone()),
        }
    }
}

impl From<&CommitMessage> for PartialCommitMessage {
    fn from(message: &CommitMessage) -> Self {
        Self {
            emoji: Some(message.emoji.clone()),
            commit_type: Some(message.commit_type.clone()),
            scope: message.scope.clone(),
            description: Some(message.description.clone()),
            body: message
                .body
                .as_ref()
                .map(|items| items.iter().map(PartialBodyItem::from).collect()),
        }
    }
}

/// Schema name used for tools and response formats.
pub const SCHEMA_NAME: &str = "commit_message";

const SCHEMA_DESCRIPTION: &str = "A gitmoji conventional commit message for the staged changes";

fn body_item_json_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "emoji": { "type": "string", "description": "The emoji for this change" },
            "type": { "type": "string", "description": "The type of this change" },
            "scope": { "type": ["string", "null"], "description": "The scope of this change (optional)" },
            "description": { "type": "string", "description": "A short description of this change" }
        },
        "required": ["emoji", "type", "scope", "description"],
        "additionalProperties": false
    })
}

/// JSON Schema of [`CommitMessage`] in strict form.
#[must_use]
pub fn commit_message_json_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "emoji": { "type": "string", "description": "The emoji that represents the type of change" },
            "type": { "type": "string", "description": "The type of change" },
            "scope": { "type": ["string", "null"], "description": "The scope of the change (optional)" },
            "description": {
                "type": "string",
                "description": "A short description in imperative mood, not exceeding 74 characters"
            },
            "body": {
                "type": ["array", "null"],
                "description": "Optional additional details about the changes",
                "items": body_item_json_schema()
            }
        },
        "required": ["emoji", "type", "scope", "description", "body"],
        "additionalProperties": false
    })
}

/// The same schema in the OpenAPI subset Gemini accepts.
#[must_use]
pub fn commit_message_openapi_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "emoji": { "type": "string", "description": "The emoji that represents the type of change" },
            "type": { "type": "string", "description": "The type of change" },
            "scope": { "type": "string", "nullable": true, "description": "The scope of the change (optional)" },
            "description": {
                "type": "string",
                "description": "A short description in imperative mood, not exceeding 74 characters"
            },
            "body": {
                "type": "array",
                "nullable": true,
                "description": "Optional additional details about the changes",
                "items": {
                    "type": "object",
                    "properties": {
                        "emoji": { "type": "string" },
                        "type": { "type": "string" },
                        "scope": { "type": "string", "nullable": true },
                        "description": { "type": "string" }
                    },
                    "required": ["emoji", "type", "description"]
                }
            }
        },
        "required": ["emoji", "type", "description"],
        "propertyOrdering": ["emoji", "type", "scope", "description", "body"]
    })
}

/// Bundles both schema dialects for a request.
#[must_use]
pub fn commit_output_schema() -> OutputSchema {
    OutputSchema {
        name: SCHEMA_NAME.to_string(),
        description: SCHEMA_DESCRIPTION.to_string(),
        json_schema: commit_message_json_schema(),
        openapi_schema: commit_message_openapi_schema(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn partial(emoji: Option<&str>, ty: Option<&str>, desc: Option<&str>) -> PartialCommitMessage {
        PartialCommitMessage {
            emoji: emoji.map(String::from),
            commit_type: ty.map(String::from),
            description: desc.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn complete_message_deserializes_with_type_field() {
        let msg: CommitMessage = serde_json::from_str(
            r#"{"emoji":"✨","type":"feat","scope":null,"description":"add login","body":null}"#,
        )
        .unwrap();
        assert_eq!(msg.commit_type, "feat");
        assert!(msg.scope.is_none());
        assert!(msg.body.is_none());
    }

    #[test]
    fn complete_message_tolerates_missing_optional_fields() {
        let msg: CommitMessage =
            serde_json::from_str(r#"{"emoji":"🐛","type":"fix","description":"null check"}"#)
                .unwrap();
        assert_eq!(msg.description, "null check");
    }

    #[test]
    fn partial_from_sparse_value() {
        let value = json!({"emoji": "✨", "body": [{"emoji": "🐛"}]});
        let msg = PartialCommitMessage::from_value(&value).unwrap();
        assert_eq!(msg.emoji.as_deref(), Some("✨"));
        assert!(msg.commit_type.is_none());
        assert_eq!(msg.body.unwrap()[0].emoji.as_deref(), Some("🐛"));
    }

    #[test]
    fn partial_from_wrong_shape_is_none() {
        assert!(PartialCommitMessage::from_value(&json!([1, 2])).is_none());
        assert!(PartialCommitMessage::from_value(&json!({"emoji": 3})).is_none());
    }

    #[test]
    fn merge_never_reverts_populated_fields() {
        let mut acc = partial(Some("✨"), Some("feat"), Some("add log"));
        acc.merge(partial(Some(""), None, Some("add login")));
        assert_eq!(acc.emoji.as_deref(), Some("✨"));
        assert_eq!(acc.commit_type.as_deref(), Some("feat"));
        assert_eq!(acc.description.as_deref(), Some("add login"));

        acc.merge(PartialCommitMessage {
            body: Some(vec![]),
            ..Default::default()
        });
        assert!(acc.body.is_none());
    }

    #[test]
    fn into_complete_requires_core_fields() {
        assert!(partial(Some("✨"), Some("feat"), None).into_complete().is_none());
        assert!(partial(Some("✨"), Some(""), Some("x")).into_complete().is_none());

        let mut msg = partial(Some("✨"), Some("feat"), Some("add login"));
        msg.scope = Some(String::new());
        msg.body = Some(vec![
            PartialBodyItem {
                emoji: Some("🐛".into()),
                commit_type: Some("fix".into()),
                scope: None,
                description: Some("null check".into()),
            },
            PartialBodyItem {
                emoji: Some("📝".into()),
                ..Default::default()
            },
        ]);
        let complete = msg.into_complete().unwrap();
        assert!(complete.scope.is_none());
        assert_eq!(complete.body.unwrap().len(), 1);
    }

    #[test]
    fn strict_schema_requires_every_property() {
        let schema = commit_message_json_schema();
        let props = schema["properties"].as_object().unwrap();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        for key in props.keys() {
            assert!(required.contains(&key.as_str()), "{key} not required");
        }
        assert_eq!(schema["additionalProperties"], json!(false));
    }
}
