//! # Metadata Schemas and Codec
//!
//! Every table, and the collection itself, carries an opaque metadata byte
//! string per row. A bound schema governs how those bytes are produced and
//! interpreted: the null schema passes raw bytes through untouched, while a
//! JSON schema validates structured values and serializes them with
//! `serde_json`.
//!
//! Schema documents are JSON objects declaring the codec plus optional
//! property constraints, e.g.
//! `{"codec":"json","properties":{"name":{"type":"string"}},"required":["name"]}`.

use serde_json::Value;

use crate::error::{Result, TreeSeqError};

/// Schema bound to a table's metadata column or the collection's top-level
/// metadata slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum MetadataSchema {
    /// No schema: metadata is opaque bytes with no validation.
    #[default]
    Null,
    /// Structured JSON object codec.
    Json(JsonSchema),
}

impl MetadataSchema {
    /// The null schema (raw bytes passthrough)
    pub fn null() -> Self {
        Self::Null
    }

    /// A bare JSON codec schema with no declared properties
    pub fn json() -> Self {
        Self::Json(JsonSchema {
            doc: serde_json::json!({ "codec": "json" }),
        })
    }

    /// Parse a schema document from its JSON text
    pub fn from_text(text: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text).map_err(|e| {
            TreeSeqError::schema_violation(format!("schema is not valid JSON: {e}"))
        })?;
        JsonSchema::new(doc).map(Self::Json)
    }

    /// The schema document text, or `None` for the null schema
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            // A Value built from valid JSON always re-serializes
            Self::Json(schema) => serde_json::to_string(&schema.doc).ok(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A parsed JSON-codec schema document
#[derive(Clone, Debug, PartialEq)]
pub struct JsonSchema {
    doc: Value,
}

impl JsonSchema {
    fn new(doc: Value) -> Result<Self> {
        let codec = doc
            .get("codec")
            .and_then(Value::as_str)
            .ok_or_else(|| TreeSeqError::schema_violation("schema must declare a codec"))?;
        if codec != "json" {
            return Err(TreeSeqError::schema_violation(format!(
                "unknown metadata codec '{codec}'"
            )));
        }
        Ok(Self { doc })
    }

    fn required(&self) -> impl Iterator<Item = &str> {
        self.doc
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    fn property_type(&self, name: &str) -> Option<&Value> {
        self.doc.get("properties")?.get(name)?.get("type")
    }

    fn has_constraints(&self) -> bool {
        self.doc.get("properties").is_some() || self.doc.get("required").is_some()
    }

    /// Check a structured value against declared required/optional properties
    fn validate(&self, value: &Value) -> Result<()> {
        let object = match value.as_object() {
            Some(object) => object,
            None if self.has_constraints() => {
                return Err(TreeSeqError::schema_violation(
                    "schema declares properties but value is not an object",
                ));
            }
            None => return Ok(()),
        };

        for name in self.required() {
            if !object.contains_key(name) {
                return Err(TreeSeqError::schema_violation(format!(
                    "required property '{name}' is missing"
                )));
            }
        }

        for (name, property) in object {
            let Some(declared) = self.property_type(name) else {
                continue;
            };
            if !type_matches(declared, property) {
                return Err(TreeSeqError::schema_violation(format!(
                    "property '{name}' does not match declared type {declared}"
                )));
            }
        }

        Ok(())
    }
}

/// Check a JSON value against a declared type, which may be a single type
/// name or an array of alternatives (e.g. `["string","null"]`).
fn type_matches(declared: &Value, value: &Value) -> bool {
    match declared {
        Value::String(name) => match name.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            "null" => value.is_null(),
            _ => false,
        },
        Value::Array(alternatives) => alternatives.iter().any(|alt| type_matches(alt, value)),
        _ => false,
    }
}

/// A metadata value on either side of the codec: raw bytes under the null
/// schema, a structured JSON value under a JSON schema.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataValue {
    Bytes(Vec<u8>),
    Structured(Value),
}

impl MetadataValue {
    /// The raw bytes, if this value is the raw-bytes variant
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Structured(_) => None,
        }
    }

    /// The structured JSON value, if present
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Bytes(_) => None,
            Self::Structured(value) => Some(value),
        }
    }
}

/// Encode a metadata value into bytes under the given schema.
///
/// With the null schema the input must already be raw bytes. With a JSON
/// schema a structured value is validated and serialized; raw bytes are
/// accepted only if they already parse as a valid value under the schema.
pub fn encode(value: &MetadataValue, schema: &MetadataSchema) -> Result<Vec<u8>> {
    match (schema, value) {
        (MetadataSchema::Null, MetadataValue::Bytes(bytes)) => Ok(bytes.clone()),
        (MetadataSchema::Null, MetadataValue::Structured(_)) => Err(
            TreeSeqError::schema_violation("no schema bound; metadata must be raw bytes"),
        ),
        (MetadataSchema::Json(json), MetadataValue::Structured(value)) => {
            json.validate(value)?;
            serde_json::to_vec(value)
                .map_err(|e| TreeSeqError::schema_violation(format!("serialization failed: {e}")))
        }
        (MetadataSchema::Json(json), MetadataValue::Bytes(bytes)) => {
            let value: Value = serde_json::from_slice(bytes).map_err(|e| {
                TreeSeqError::schema_violation(format!("bytes are not valid encoded metadata: {e}"))
            })?;
            json.validate(&value)?;
            Ok(bytes.clone())
        }
    }
}

/// Decode metadata bytes under the given schema.
///
/// The null schema returns the bytes unchanged; a JSON schema parses them,
/// failing with `MalformedMetadata` if they are not valid under the codec.
pub fn decode(bytes: &[u8], schema: &MetadataSchema) -> Result<MetadataValue> {
    match schema {
        MetadataSchema::Null => Ok(MetadataValue::Bytes(bytes.to_vec())),
        MetadataSchema::Json(_) => {
            let value: Value = serde_json::from_slice(bytes).map_err(|e| {
                TreeSeqError::malformed_metadata(format!("metadata is not valid JSON: {e}"))
            })?;
            Ok(MetadataValue::Structured(value))
        }
    }
}
