use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Registry entry for a callable tool, serialized exactly as `tools/list` emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// One block of `tools/call` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolContent::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    #[error("missing required argument '{field}'")]
    Missing { field: String },
    #[error("argument '{field}' must be of type {expected}")]
    WrongType { field: String, expected: String },
    #[error("argument '{field}' has unsupported value {received}; expected one of: {allowed}")]
    NotAllowed {
        field: String,
        received: Value,
        allowed: String,
    },
}

impl ArgumentError {
    pub fn field(&self) -> &str {
        match self {
            ArgumentError::Missing { field }
            | ArgumentError::WrongType { field, .. }
            | ArgumentError::NotAllowed { field, .. } => field,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "field": self.field(),
            "reason": self.to_string(),
        });
        if let ArgumentError::NotAllowed { received, .. } = self {
            payload["received"] = received.clone();
        }
        payload
    }
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    pub fn required_arguments(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    fn property_schema(&self, name: &str) -> Option<&Value> {
        self.input_schema.get("properties")?.get(name)
    }

    /// Checks `arguments` against the schema's `required`, `type` and `enum` constraints.
    ///
    /// Properties the schema does not declare are passed through untouched.
    pub fn validate_arguments(&self, arguments: &Map<String, Value>) -> Result<(), ArgumentError> {
        for field in self.required_arguments() {
            match arguments.get(field) {
                None | Some(Value::Null) => {
                    return Err(ArgumentError::Missing {
                        field: field.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        for (field, value) in arguments {
            if value.is_null() {
                continue;
            }
            let Some(schema) = self.property_schema(field) else {
                continue;
            };
            check_value(field, value, schema)?;
            if let (Some(items), Some(elements)) = (schema.get("items"), value.as_array()) {
                for element in elements {
                    check_value(&format!("{field}[]"), element, items)?;
                }
            }
        }

        Ok(())
    }
}

fn check_value(field: &str, value: &Value, schema: &Value) -> Result<(), ArgumentError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        let matches = match expected {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !matches {
            return Err(ArgumentError::WrongType {
                field: field.to_string(),
                expected: expected.to_string(),
            });
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let allowed = allowed
                .iter()
                .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ArgumentError::NotAllowed {
                field: field.to_string(),
                received: value.clone(),
                allowed,
            });
        }
    }

    Ok(())
}
