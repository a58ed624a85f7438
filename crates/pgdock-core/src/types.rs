//! Core value and metadata types

use serde::{Deserialize, Serialize};

/// A single field value as produced by the stream parsers.
///
/// The set is deliberately closed: parsed input is either NULL, plain text,
/// or a structured value kept as its raw JSON serialization. Keeping JSON as
/// text preserves the exact payload through the escape/load pipeline without
/// a decode/re-encode round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// NULL value
    Null,
    /// Plain text value
    Text(String),
    /// Structured value, stored as raw JSON text
    RawJson(String),
}

impl FieldValue {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// The textual payload of a `Text` value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The raw serialized form of a structured value
    pub fn as_raw_json(&self) -> Option<&str> {
        match self {
            FieldValue::RawJson(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::RawJson(s) => write!(f, "{}", s),
        }
    }
}

/// One parsed row: ordered values, plus a parallel name list for formats
/// that key fields by column name (JSON object rows, XML `col name=`).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    values: Vec<FieldValue>,
    names: Option<Vec<String>>,
}

impl ParsedRow {
    /// Create a positional row (delimited formats)
    pub fn positional(values: Vec<FieldValue>) -> Self {
        Self {
            values,
            names: None,
        }
    }

    /// Create a name-keyed row; `names` and `values` are parallel
    pub fn named(names: Vec<String>, values: Vec<FieldValue>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self {
            values,
            names: Some(names),
        }
    }

    /// Ordered field values
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Field names parallel to `values`, when the format carries them
    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// Number of fields in the row
    pub fn arity(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the row, yielding its values
    pub fn into_values(self) -> Vec<FieldValue> {
        self.values
    }
}

/// Metadata for one column of the target table, as supplied by the caller's
/// schema introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Column name
    pub name: String,
    /// Type name as reported by the catalog (e.g. "integer", "bytea", "jsonb")
    pub data_type: String,
    /// 0-based position in the table
    pub ordinal: usize,
    /// Whether the column accepts NULL
    pub nullable: bool,
    /// Default expression, if any
    pub default_value: Option<String>,
    /// Whether the column is declared as an identity column
    pub identity: bool,
}

impl TableColumn {
    /// Create a column with the given name and type; remaining fields take
    /// neutral defaults and can be adjusted with the `with_*` builders.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ordinal: 0,
            nullable: true,
            default_value: None,
            identity: false,
        }
    }

    /// Set the 0-based column position
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Set the default expression
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    /// Mark the column as an identity column
    pub fn with_identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Column holds binary data (bytea)
    pub fn is_binary(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("bytea")
    }

    /// Column holds structured data (json/jsonb)
    pub fn is_structured(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("json") || self.data_type.eq_ignore_ascii_case("jsonb")
    }

    /// Column value is auto-generated: identity, or a sequence default
    /// (`nextval(...)`), or a serial pseudo-type.
    pub fn has_sequence_default(&self) -> bool {
        if self.identity {
            return true;
        }
        let ty = self.data_type.to_ascii_lowercase();
        if matches!(ty.as_str(), "serial" | "bigserial" | "smallserial") {
            return true;
        }
        self.default_value
            .as_deref()
            .map(|d| d.trim_start().to_ascii_lowercase().starts_with("nextval("))
            .unwrap_or(false)
    }

    /// Column is an integer kind (candidates for the serial-omission heuristic)
    pub fn is_integer_kind(&self) -> bool {
        matches!(
            self.data_type.to_ascii_lowercase().as_str(),
            "smallint"
                | "int2"
                | "integer"
                | "int"
                | "int4"
                | "bigint"
                | "int8"
                | "serial"
                | "bigserial"
                | "smallserial"
        )
    }
}
