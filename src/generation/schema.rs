//! Output schemas and reply validation.
//!
//! An [`OutputSchema`] names the fields a generation call must return and the
//! shape of each value. The same schema renders the format hint sent to the
//! model and validates what comes back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Expected shape of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldShape {
    /// A single string.
    Text,
    /// An ordered sequence of strings.
    List,
}

/// One named field of an output schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    /// Human-readable description of the expected value, shown to the model.
    pub description: String,
    pub shape: FieldShape,
}

/// Ordered mapping from field name to expected value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSchema {
    fields: Vec<SchemaField>,
}

impl OutputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string field. Re-declaring a name replaces the earlier field in place.
    pub fn text(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(name.into(), description.into(), FieldShape::Text)
    }

    /// Add a string-list field.
    pub fn list(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(name.into(), description.into(), FieldShape::List)
    }

    fn field(mut self, name: String, description: String, shape: FieldShape) -> Self {
        let field = SchemaField {
            name,
            description,
            shape,
        };
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON rendering of the schema in declared order, e.g.
    /// `{"summary": "summary of the transcript", "tags": ["a tag"]}`.
    pub fn format_hint(&self) -> String {
        let entries: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                let key = Value::String(f.name.clone());
                let description = Value::String(f.description.clone());
                match f.shape {
                    FieldShape::Text => format!("{}: {}", key, description),
                    FieldShape::List => format!("{}: [{}]", key, description),
                }
            })
            .collect();
        format!("{{{}}}", entries.join(", "))
    }

    /// Check a decoded value against the schema.
    ///
    /// The key set must match exactly and every value must have its declared shape.
    pub fn validate(&self, value: &Value) -> std::result::Result<GenerationResult, String> {
        let object = value
            .as_object()
            .ok_or_else(|| format!("expected a JSON object, got {}", json_kind(value)))?;

        let mut values = BTreeMap::new();
        for field in &self.fields {
            let raw = object
                .get(&field.name)
                .ok_or_else(|| format!("{} not in json output", field.name))?;
            let converted = match (field.shape, raw) {
                (FieldShape::Text, Value::String(s)) => FieldValue::Text(s.clone()),
                (FieldShape::List, Value::Array(items)) => {
                    let mut list = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(s) => list.push(s.clone()),
                            other => {
                                return Err(format!(
                                    "{} must be a list of strings, found {} element",
                                    field.name,
                                    json_kind(other)
                                ))
                            }
                        }
                    }
                    FieldValue::List(list)
                }
                (FieldShape::Text, other) => {
                    return Err(format!("{} must be a string, got {}", field.name, json_kind(other)))
                }
                (FieldShape::List, other) => {
                    return Err(format!("{} must be a list, got {}", field.name, json_kind(other)))
                }
            };
            values.insert(field.name.clone(), converted);
        }

        if let Some(extra) = object
            .keys()
            .find(|k| !self.fields.iter().any(|f| &f.name == *k))
        {
            return Err(format!("unexpected key {} in json output", extra));
        }

        Ok(GenerationResult { values })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A validated field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

/// Validated reply: exactly the schema's keys, each with its declared shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    values: BTreeMap<String, FieldValue>,
}

impl GenerationResult {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(FieldValue::List(items)) => Some(items),
            _ => None,
        }
    }

    /// Move a text value out of the result.
    pub fn take_text(&mut self, name: &str) -> Option<String> {
        match self.values.remove(name) {
            Some(FieldValue::Text(s)) => Some(s),
            Some(other) => {
                self.values.insert(name.to_string(), other);
                None
            }
            None => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Cut the JSON payload out of a reply that may carry markdown fences or prose.
fn extract_json(reply: &str, open: char, close: char) -> &str {
    let start = reply.find(open);
    let end = reply.rfind(close);
    match (start, end) {
        (Some(start), Some(end)) if end > start => &reply[start..=end],
        _ => reply.trim(),
    }
}

/// Decode a single-object reply.
pub fn decode_reply(schema: &OutputSchema, reply: &str) -> std::result::Result<GenerationResult, String> {
    let json = extract_json(reply, '{', '}');
    let value: Value = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {}", e))?;
    schema.validate(&value)
}

/// Decode a batch reply: a JSON array with exactly `expected` objects.
pub fn decode_batch_reply(
    schema: &OutputSchema,
    reply: &str,
    expected: usize,
) -> std::result::Result<Vec<GenerationResult>, String> {
    let json = extract_json(reply, '[', ']');
    let value: Value = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {}", e))?;
    let items = value
        .as_array()
        .ok_or_else(|| "Output format not in an array of json".to_string())?;
    if items.len() != expected {
        return Err(format!(
            "expected {} elements in the output array, got {}",
            expected,
            items.len()
        ));
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| schema.validate(item).map_err(|e| format!("element {}: {}", i, e)))
        .collect()
}
