//! Import options shared across the parsing and loading stages.

use serde::{Deserialize, Serialize};

/// Source format of an uploaded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportFormat {
    Csv,
    Tsv,
    Json,
    Xml,
}

impl ImportFormat {
    /// Field delimiter for the delimited formats.
    pub fn delimiter(&self) -> Option<u8> {
        match self {
            ImportFormat::Csv => Some(b','),
            ImportFormat::Tsv => Some(b'\t'),
            ImportFormat::Json | ImportFormat::Xml => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportFormat::Csv => "csv",
            ImportFormat::Tsv => "tsv",
            ImportFormat::Json => "json",
            ImportFormat::Xml => "xml",
        }
    }
}

/// How textual payloads destined for binary (bytea) columns are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteaEncoding {
    /// Hex digits, with or without a `\x` / `0x` prefix.
    Hex,
    /// Standard base64.
    Base64,
    /// PostgreSQL escape format (`\\` and `\ooo` sequences).
    Escape,
    /// Already backslash-octal escaped; passed through unchanged.
    Octal,
}

/// Options for one import stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Source format of the uploaded bytes.
    pub format: ImportFormat,
    /// Whether the first row (or the document's column list) names the
    /// target columns.
    pub use_header: bool,
    /// Field values treated as SQL NULL in addition to explicit nulls.
    pub allowed_nulls: Vec<String>,
    /// Encoding of values destined for bytea columns.
    pub bytea_encoding: ByteaEncoding,
    /// Truncate the target table before the first load of this run.
    pub truncate: bool,
    /// Overrides leading-serial-column detection for positional rows.
    /// `Some(true)` forces the leading target column to be treated as an
    /// omitted serial, `Some(false)` disables the heuristic, `None` lets
    /// the mapper decide from the column metadata.
    pub omit_serial: Option<bool>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: ImportFormat::Csv,
            use_header: true,
            allowed_nulls: vec!["NULL".to_string(), "\\N".to_string()],
            bytea_encoding: ByteaEncoding::Hex,
            truncate: false,
            omit_serial: None,
        }
    }
}

impl ImportOptions {
    pub fn new(format: ImportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, use_header: bool) -> Self {
        self.use_header = use_header;
        self
    }

    pub fn with_allowed_nulls(mut self, sentinels: Vec<String>) -> Self {
        self.allowed_nulls = sentinels;
        self
    }

    pub fn with_bytea_encoding(mut self, encoding: ByteaEncoding) -> Self {
        self.bytea_encoding = encoding;
        self
    }

    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn with_omit_serial(mut self, omit: Option<bool>) -> Self {
        self.omit_serial = omit;
        self
    }

    /// Whether `text` matches one of the configured null sentinels.
    pub fn is_null_sentinel(&self, text: &str) -> bool {
        self.allowed_nulls.iter().any(|s| s == text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_null_sentinels() {
        let options = ImportOptions::default();
        assert!(options.is_null_sentinel("NULL"));
        assert!(options.is_null_sentinel("\\N"));
        assert!(!options.is_null_sentinel("null"));
        assert!(!options.is_null_sentinel(""));
    }

    #[test]
    fn test_format_delimiters() {
        assert_eq!(ImportFormat::Csv.delimiter(), Some(b','));
        assert_eq!(ImportFormat::Tsv.delimiter(), Some(b'\t'));
        assert_eq!(ImportFormat::Json.delimiter(), None);
    }

    #[test]
    fn test_options_serde_round_trip() {
        let options = ImportOptions::new(ImportFormat::Json)
            .with_header(false)
            .with_bytea_encoding(ByteaEncoding::Base64)
            .with_omit_serial(Some(true));
        let json = serde_json::to_string(&options).unwrap();
        let back: ImportOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.format, ImportFormat::Json);
        assert!(!back.use_header);
        assert_eq!(back.bytea_encoding, ByteaEncoding::Base64);
        assert_eq!(back.omit_serial, Some(true));
    }
}
