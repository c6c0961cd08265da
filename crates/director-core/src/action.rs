//! Action definitions advertised by games.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An invokable operation a game has registered.
///
/// The `schema` is an opaque parameter-shape descriptor; the director never
/// inspects it beyond passing it along.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique name within one game's catalogue.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Optional parameter schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl Action {
    /// Create an action without a parameter schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: None,
        }
    }

    /// Attach a parameter schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}
