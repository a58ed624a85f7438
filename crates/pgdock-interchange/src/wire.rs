//! COPY text wire format: field escaping, bytea payload decoding, and
//! row-to-line conversion.
//!
//! Every row ends up as one tab-separated, newline-terminated line in which
//! no unescaped tab, newline, or backslash survives. Binary payloads are
//! re-encoded as per-byte backslash-octal sequences.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use pgdock_core::{FieldValue, ParsedRow};
use thiserror::Error;

use crate::mapping::ColumnMapping;
use crate::options::{ByteaEncoding, ImportOptions};

/// Field value the server reads as SQL NULL.
pub const NULL_MARKER: &str = "\\N";

/// End-of-data line closing a COPY stream.
pub const TERMINATOR_LINE: &str = "\\.\n";

/// Escape sequences for the bytes the COPY text format cannot carry raw.
static COPY_ESCAPES: [Option<&str>; 256] = {
    let mut table: [Option<&str>; 256] = [None; 256];
    table[0] = Some("\\000");
    table[b'\t' as usize] = Some("\\t");
    table[b'\n' as usize] = Some("\\n");
    table[b'\r' as usize] = Some("\\r");
    table[b'\\' as usize] = Some("\\\\");
    table
};

/// Errors when a row cannot be converted to a wire line.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("row has {actual} fields but the column mapping expects {expected}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("named row carries no value for mapped column {column}")]
    FieldMissing { column: String },
}

/// Errors when a textual binary payload cannot be decoded.
#[derive(Debug, Error)]
pub enum ByteaDecodeError {
    #[error("invalid hex payload: {0}")]
    Hex(String),

    #[error("invalid base64 payload: {0}")]
    Base64(String),

    #[error("invalid escape sequence at byte {0}")]
    Escape(usize),
}

/// One escaped COPY text line, newline terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireLine(pub(crate) String);

impl WireLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for WireLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escapes one text field for the COPY text format.
///
/// NUL becomes `\000`; tab, newline, carriage return, and backslash get their
/// backslash escapes. A second pass then collapses `\\ooo` back to `\ooo` so
/// text that already carries three-digit octal escapes is not escaped twice.
/// That repair is intentionally greedy: any backslash directly followed by
/// three octal digits is treated as a pre-escaped byte.
pub fn escape_copy_text(input: &str) -> String {
    repair_octal(&escape_pass(input))
}

fn escape_pass(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len() + 8);
    let mut i = 0;
    while i < bytes.len() {
        if let Some(escape) = COPY_ESCAPES[bytes[i] as usize] {
            out.push_str(escape);
            i += 1;
            continue;
        }
        // run of bytes that pass through untouched; the run always ends at
        // an ASCII escape byte or the end of the string, so slicing is safe
        let start = i;
        while i < bytes.len() && COPY_ESCAPES[bytes[i] as usize].is_none() {
            i += 1;
        }
        out.push_str(&input[start..i]);
    }
    out
}

fn repair_octal(escaped: &str) -> String {
    let bytes = escaped.as_bytes();
    let mut out = String::with_capacity(escaped.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 4 < bytes.len()
            && bytes[i + 1] == b'\\'
            && bytes[i + 2].is_ascii_digit()
            && bytes[i + 2] <= b'7'
            && bytes[i + 3].is_ascii_digit()
            && bytes[i + 3] <= b'7'
            && bytes[i + 4].is_ascii_digit()
            && bytes[i + 4] <= b'7'
        {
            out.push('\\');
            out.push_str(&escaped[i + 2..i + 5]);
            i += 5;
        } else {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != b'\\' {
                i += 1;
            }
            out.push_str(&escaped[start..i]);
        }
    }
    out
}

/// Decodes a textual binary payload into raw bytes.
///
/// Hex accepts an optional `\x` or `0x` prefix and ignores whitespace, as
/// does base64. `Octal` payloads share the escape-format syntax; the
/// converter passes them through without decoding, but decoding one here
/// yields its raw bytes all the same.
pub fn decode_bytea(text: &str, encoding: ByteaEncoding) -> Result<Vec<u8>, ByteaDecodeError> {
    match encoding {
        ByteaEncoding::Hex => {
            let stripped = text
                .strip_prefix("\\x")
                .or_else(|| text.strip_prefix("0x"))
                .unwrap_or(text);
            let cleaned: String = stripped.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            hex::decode(&cleaned).map_err(|e| ByteaDecodeError::Hex(e.to_string()))
        }
        ByteaEncoding::Base64 => {
            let cleaned: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            BASE64
                .decode(cleaned.as_bytes())
                .map_err(|e| ByteaDecodeError::Base64(e.to_string()))
        }
        ByteaEncoding::Escape | ByteaEncoding::Octal => decode_escape_format(text),
    }
}

fn decode_escape_format(text: &str) -> Result<Vec<u8>, ByteaDecodeError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        if i + 1 < bytes.len() && bytes[i + 1] == b'\\' {
            out.push(b'\\');
            i += 2;
        } else if i + 3 < bytes.len()
            && (b'0'..=b'3').contains(&bytes[i + 1])
            && (b'0'..=b'7').contains(&bytes[i + 2])
            && (b'0'..=b'7').contains(&bytes[i + 3])
        {
            let value =
                (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            return Err(ByteaDecodeError::Escape(i));
        }
    }
    Ok(out)
}

/// Re-encodes raw bytes as backslash-octal, one `\ooo` escape per byte.
///
/// The output is already in wire form and must not be escaped again.
pub fn encode_octal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for &b in bytes {
        out.push('\\');
        out.push(char::from(b'0' + ((b >> 6) & 0x7)));
        out.push(char::from(b'0' + ((b >> 3) & 0x7)));
        out.push(char::from(b'0' + (b & 0x7)));
    }
    out
}

/// Converts one parsed row into a COPY text line using the column mapping
/// and import options.
///
/// Field order follows the mapping. Positional rows are read by index;
/// name-keyed rows carry no field-order guarantee, so each mapped column is
/// resolved against the row's own names. Explicit nulls and null-sentinel
/// matches become the NULL marker; payloads for binary columns are decoded
/// and re-encoded as backslash-octal, falling back to literal text escaping
/// when the payload does not decode; everything else, structured JSON text
/// included, passes through with line escaping applied.
pub fn to_wire_line(
    row: &ParsedRow,
    mapping: &ColumnMapping,
    options: &ImportOptions,
) -> Result<WireLine, ConvertError> {
    let values = row.values();
    if values.len() != mapping.len() {
        return Err(ConvertError::ArityMismatch {
            expected: mapping.len(),
            actual: values.len(),
        });
    }

    let mut line = String::new();
    for (index, binding) in mapping.columns().iter().enumerate() {
        if index > 0 {
            line.push('\t');
        }
        let value = match row.names() {
            Some(names) => names
                .iter()
                .position(|name| name == &binding.target_name)
                .and_then(|at| values.get(at))
                .ok_or_else(|| ConvertError::FieldMissing {
                    column: binding.target_name.clone(),
                })?,
            None => &values[index],
        };
        let text = match value {
            FieldValue::Null => {
                line.push_str(NULL_MARKER);
                continue;
            }
            FieldValue::Text(text) if options.is_null_sentinel(text) => {
                line.push_str(NULL_MARKER);
                continue;
            }
            FieldValue::Text(text) => text,
            FieldValue::RawJson(text) => text,
        };

        if binding.is_binary {
            match options.bytea_encoding {
                ByteaEncoding::Octal => line.push_str(&escape_copy_text(text)),
                encoding => match decode_bytea(text, encoding) {
                    Ok(bytes) => line.push_str(&encode_octal(&bytes)),
                    Err(error) => {
                        tracing::debug!(
                            column = %binding.target_name,
                            %error,
                            "bytea payload did not decode, loading literal text"
                        );
                        line.push_str(&escape_copy_text(text));
                    }
                },
            }
        } else {
            line.push_str(&escape_copy_text(text));
        }
    }
    line.push('\n');
    Ok(WireLine(line))
}

/// Builds the `COPY ... FROM STDIN` directive for a table and column list.
pub fn copy_directive(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        format!("COPY {} FROM STDIN", quote_table(table))
    } else {
        let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        format!(
            "COPY {} ({}) FROM STDIN",
            quote_table(table),
            quoted.join(", ")
        )
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn quote_table(table: &str) -> String {
    match table.split_once('.') {
        Some((schema, name)) => format!("{}.{}", quote_ident(schema), quote_ident(name)),
        None => quote_ident(table),
    }
}
