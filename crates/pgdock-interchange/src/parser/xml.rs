//! XML parser.
//!
//! Recognizes `<header>` with `<col name="..."/>` children and `<row>`
//! elements whose `<col name="..." isNull="...">` children carry the field
//! values. Any other element (the document wrapper, declarations, comments)
//! is structural noise and ignored. Text content is entity-decoded when the
//! enclosing `col` closes; CDATA content is taken verbatim. An incomplete
//! tag, CDATA marker, or text run at the end of a chunk stays pending.

use pgdock_core::{FieldValue, ParsedRow};

use super::{ChunkOutput, ParseError};

const CDATA_OPEN: &[u8] = b"<![CDATA[";
const CDATA_CLOSE: &[u8] = b"]]>";
const COMMENT_OPEN: &[u8] = b"<!--";
const COMMENT_CLOSE: &[u8] = b"-->";

#[derive(Debug)]
pub(crate) struct XmlState {
    pending: Vec<u8>,
    base: usize,
    header: Option<Vec<String>>,
    header_cols: Vec<String>,
    in_header: bool,
    in_row: bool,
    in_col: bool,
    in_cdata: bool,
    col_name: Option<String>,
    col_is_null: bool,
    col_text: String,
    row_names: Vec<Option<String>>,
    row_values: Vec<FieldValue>,
}

impl XmlState {
    pub(crate) fn new() -> Self {
        Self {
            pending: Vec::new(),
            base: 0,
            header: None,
            header_cols: Vec::new(),
            in_header: false,
            in_row: false,
            in_col: false,
            in_cdata: false,
            col_name: None,
            col_is_null: false,
            col_text: String::new(),
            row_names: Vec::new(),
            row_values: Vec::new(),
        }
    }

    pub(crate) fn parse_chunk(&mut self, chunk: &[u8]) -> Result<ChunkOutput, ParseError> {
        self.pending.extend_from_slice(chunk);
        self.drive(false)
    }

    pub(crate) fn finish(&mut self) -> Result<ChunkOutput, ParseError> {
        let output = self.drive(true)?;
        if self.in_cdata {
            return Err(ParseError::UnexpectedEof("CDATA section"));
        }
        if self.in_col {
            return Err(ParseError::UnexpectedEof("col element"));
        }
        if self.in_row {
            return Err(ParseError::UnexpectedEof("row element"));
        }
        if self.in_header {
            return Err(ParseError::UnexpectedEof("header element"));
        }
        if !self.pending.is_empty() {
            return Err(ParseError::UnexpectedEof("tag"));
        }
        Ok(output)
    }

    pub(crate) fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub(crate) fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    fn drive(&mut self, at_end: bool) -> Result<ChunkOutput, ParseError> {
        let buf = std::mem::take(&mut self.pending);
        let mut output = ChunkOutput::default();
        let mut pos = 0;
        let result = loop {
            match self.step(&buf, pos, at_end, &mut output) {
                Ok(Some(next)) => pos = next,
                Ok(None) => break Ok(()),
                Err(error) => break Err(error),
            }
        };
        self.base += pos;
        self.pending = buf[pos..].to_vec();
        result.map(|()| output)
    }

    /// Consumes one unit (a tag, a text run, or a stretch of CDATA) and
    /// returns the new cursor, or `None` when more bytes are needed.
    fn step(
        &mut self,
        buf: &[u8],
        pos: usize,
        at_end: bool,
        output: &mut ChunkOutput,
    ) -> Result<Option<usize>, ParseError> {
        if pos >= buf.len() {
            return Ok(None);
        }

        if self.in_cdata {
            return self.consume_cdata(buf, pos);
        }

        if buf[pos] == b'<' {
            return self.consume_markup(buf, pos, output);
        }

        // text run up to the next tag
        match find(&buf[pos..], b"<") {
            Some(rel) => {
                self.absorb_text(&buf[pos..pos + rel], pos)?;
                Ok(Some(pos + rel))
            }
            None if at_end => {
                self.absorb_text(&buf[pos..], pos)?;
                Ok(Some(buf.len()))
            }
            // the run may continue in the next chunk
            None => Ok(None),
        }
    }

    fn consume_cdata(&mut self, buf: &[u8], pos: usize) -> Result<Option<usize>, ParseError> {
        match find(&buf[pos..], CDATA_CLOSE) {
            Some(rel) => {
                self.push_raw_text(&buf[pos..pos + rel], pos)?;
                self.in_cdata = false;
                Ok(Some(pos + rel + CDATA_CLOSE.len()))
            }
            None => {
                // hold back a trailing "]" or "]]" that could open the
                // close marker across the chunk boundary, and never cut a
                // multibyte character in half
                let slice = &buf[pos..];
                let keep = if slice.ends_with(b"]]") {
                    2
                } else if slice.ends_with(b"]") {
                    1
                } else {
                    0
                };
                let safe = utf8_safe_len(&slice[..slice.len() - keep]);
                if safe == 0 {
                    return Ok(None);
                }
                self.push_raw_text(&buf[pos..pos + safe], pos)?;
                Ok(Some(pos + safe))
            }
        }
    }

    fn consume_markup(
        &mut self,
        buf: &[u8],
        pos: usize,
        output: &mut ChunkOutput,
    ) -> Result<Option<usize>, ParseError> {
        let rest = &buf[pos..];

        if rest.starts_with(CDATA_OPEN) {
            self.in_cdata = true;
            return Ok(Some(pos + CDATA_OPEN.len()));
        }
        if is_partial_prefix(rest, CDATA_OPEN) {
            return Ok(None);
        }
        if rest.starts_with(COMMENT_OPEN) {
            return match find(&rest[COMMENT_OPEN.len()..], COMMENT_CLOSE) {
                Some(rel) => Ok(Some(pos + COMMENT_OPEN.len() + rel + COMMENT_CLOSE.len())),
                None => Ok(None),
            };
        }
        if is_partial_prefix(rest, COMMENT_OPEN) {
            return Ok(None);
        }

        // ordinary tag: scan to `>` outside attribute quotes
        let mut i = pos + 1;
        let mut quote: Option<u8> = None;
        while i < buf.len() {
            match buf[i] {
                q @ (b'"' | b'\'') => {
                    quote = match quote {
                        None => Some(q),
                        Some(open) if open == q => None,
                        other => other,
                    };
                }
                b'>' if quote.is_none() => {
                    self.handle_tag(&buf[pos + 1..i], pos, output)?;
                    return Ok(Some(i + 1));
                }
                _ => {}
            }
            i += 1;
        }
        Ok(None)
    }

    fn handle_tag(
        &mut self,
        tag: &[u8],
        pos: usize,
        output: &mut ChunkOutput,
    ) -> Result<(), ParseError> {
        let text = std::str::from_utf8(tag)
            .map_err(|_| malformed(self.base + pos, "tag is not valid UTF-8"))?
            .trim();

        if let Some(name) = text.strip_prefix('/') {
            return self.handle_closing(name.trim(), pos, output);
        }

        let self_closing = text.ends_with('/');
        let body = if self_closing {
            text[..text.len() - 1].trim_end()
        } else {
            text
        };
        let (name, attr_text) = match body.find(|c: char| c.is_ascii_whitespace()) {
            Some(split) => (&body[..split], &body[split..]),
            None => (body, ""),
        };

        match name {
            "header" => {
                self.in_header = true;
                self.header_cols.clear();
                if self_closing {
                    return self.handle_closing("header", pos, output);
                }
            }
            "row" => {
                self.in_row = true;
                self.row_names.clear();
                self.row_values.clear();
                if self_closing {
                    return self.handle_closing("row", pos, output);
                }
            }
            "col" if self.in_header || self.in_row => {
                let attrs = parse_attributes(attr_text);
                self.in_col = true;
                self.col_text.clear();
                self.col_name = attrs
                    .iter()
                    .find(|(k, _)| k == "name")
                    .map(|(_, v)| v.clone());
                self.col_is_null = attrs
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("isnull"))
                    .map(|(_, v)| is_truthy(v))
                    .unwrap_or(false);
                if self_closing {
                    return self.handle_closing("col", pos, output);
                }
            }
            // wrapper elements, declarations, processing instructions
            _ => {}
        }
        Ok(())
    }

    fn handle_closing(
        &mut self,
        name: &str,
        pos: usize,
        output: &mut ChunkOutput,
    ) -> Result<(), ParseError> {
        match name {
            "col" if self.in_col => self.close_col(pos)?,
            "row" if self.in_row => {
                self.in_row = false;
                if !self.row_values.is_empty() {
                    let values = std::mem::take(&mut self.row_values);
                    let names = std::mem::take(&mut self.row_names);
                    let all_named: Option<Vec<String>> = names.into_iter().collect();
                    let row = match all_named {
                        Some(names) => ParsedRow::named(names, values),
                        None => ParsedRow::positional(values),
                    };
                    output.rows.push(row);
                }
            }
            "header" if self.in_header => {
                self.in_header = false;
                let cols = std::mem::take(&mut self.header_cols);
                output.header = Some(cols.clone());
                self.header = Some(cols);
            }
            _ => {}
        }
        Ok(())
    }

    fn close_col(&mut self, pos: usize) -> Result<(), ParseError> {
        self.in_col = false;
        let text = std::mem::take(&mut self.col_text);
        let name = self.col_name.take();
        if self.in_header {
            // attribute name wins; element text is the fallback
            let name = match name {
                Some(name) => name,
                None if !text.trim().is_empty() => text.trim().to_string(),
                None => {
                    return Err(malformed(
                        self.base + pos,
                        "header col has neither a name attribute nor text",
                    ));
                }
            };
            self.header_cols.push(name);
        } else {
            let value = if self.col_is_null {
                FieldValue::Null
            } else {
                FieldValue::Text(text)
            };
            self.col_is_null = false;
            self.row_names.push(name);
            self.row_values.push(value);
        }
        Ok(())
    }

    fn absorb_text(&mut self, bytes: &[u8], pos: usize) -> Result<(), ParseError> {
        if !self.in_col {
            // stray text between elements carries nothing
            return Ok(());
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|_| malformed(self.base + pos, "text is not valid UTF-8"))?;
        self.col_text.push_str(&decode_entities(text));
        Ok(())
    }

    fn push_raw_text(&mut self, bytes: &[u8], pos: usize) -> Result<(), ParseError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| malformed(self.base + pos, "CDATA is not valid UTF-8"))?;
        if self.in_col {
            self.col_text.push_str(text);
        }
        Ok(())
    }
}

fn malformed(offset: usize, message: impl Into<String>) -> ParseError {
    ParseError::Malformed {
        format: "xml",
        message: format!("{} at byte {}", message.into(), offset),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Length of the longest prefix that does not end mid-way through a
/// multibyte UTF-8 sequence.
fn utf8_safe_len(bytes: &[u8]) -> usize {
    let mut i = bytes.len();
    let mut walked = 0;
    while i > 0 && walked < 4 {
        i -= 1;
        walked += 1;
        let b = bytes[i];
        if b < 0x80 {
            return bytes.len();
        }
        if b >= 0xC0 {
            let needed = if b >= 0xF0 {
                4
            } else if b >= 0xE0 {
                3
            } else {
                2
            };
            return if i + needed <= bytes.len() {
                bytes.len()
            } else {
                i
            };
        }
    }
    // four continuation bytes in a row cannot be a cut sequence; let the
    // decoder report the invalid input
    bytes.len()
}

fn is_partial_prefix(slice: &[u8], pattern: &[u8]) -> bool {
    slice.len() < pattern.len() && pattern.starts_with(slice)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "t" | "yes" | "y"
    )
}

/// Parses `key="value"` pairs from the text after a tag name. Unquoted
/// values and stray tokens are tolerated, not errors.
fn parse_attributes(text: &str) -> Vec<(String, String)> {
    let bytes = text.as_bytes();
    let mut attrs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == key_start {
            i += 1;
            continue;
        }
        let key = text[key_start..i].to_string();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let value = match bytes[i] {
            q @ (b'"' | b'\'') => {
                i += 1;
                let value_start = i;
                while i < bytes.len() && bytes[i] != q {
                    i += 1;
                }
                let value = &text[value_start..i];
                i += 1;
                value
            }
            _ => {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                &text[value_start..i]
            }
        };
        attrs.push((key, decode_entities(value)));
    }
    attrs
}

/// Decodes the named XML entities plus numeric references. Anything
/// unrecognized is kept literally rather than dropped.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let code = entity
                        .strip_prefix("#x")
                        .or_else(|| entity.strip_prefix("#X"))
                        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                        .or_else(|| {
                            entity
                                .strip_prefix('#')
                                .and_then(|dec| dec.parse::<u32>().ok())
                        });
                    code.and_then(char::from_u32)
                }
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
