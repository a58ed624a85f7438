//! JSON parser.
//!
//! Expects a top-level object with an optional `columns` array of names and
//! a `data` array of rows; rows are arrays (positional) or objects (name
//! keyed). Scalars become field values directly; a nested object or array is
//! captured verbatim, validated, and kept as raw JSON text. Values of other
//! top-level keys are skipped. Parsing is token-incremental: a token (or a
//! whole nested value) that is not complete in the buffer stays pending.

use pgdock_core::{FieldValue, ParsedRow};

use super::{ChunkOutput, ParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    TopKey,
    TopColon,
    TopValue,
    Columns,
    ColumnsComma,
    Rows,
    RowsComma,
    ArrayRow,
    ArrayRowComma,
    ObjectRowKey,
    ObjectRowColon,
    ObjectRowValue,
    ObjectRowComma,
    TopComma,
    End,
}

#[derive(Debug)]
enum Token {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Str(String),
    Literal(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LBrace => "`{`".to_string(),
            Token::RBrace => "`}`".to_string(),
            Token::LBracket => "`[`".to_string(),
            Token::RBracket => "`]`".to_string(),
            Token::Colon => "`:`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Str(_) => "a string".to_string(),
            Token::Literal(text) => format!("`{text}`"),
        }
    }
}

#[derive(Debug)]
enum Scan {
    Token {
        token: Token,
        start: usize,
        next: usize,
    },
    /// More bytes are needed to complete the token at the cursor.
    Incomplete,
    /// Only whitespace remains.
    Empty,
}

enum Step {
    Advance(usize),
    Hold,
}

#[derive(Debug)]
pub(crate) struct JsonState {
    pending: Vec<u8>,
    /// Bytes consumed in earlier calls, for error offsets.
    base: usize,
    phase: Phase,
    top_key: String,
    header: Option<Vec<String>>,
    header_cols: Vec<String>,
    row_names: Vec<String>,
    row_values: Vec<FieldValue>,
    current_key: Option<String>,
}

impl JsonState {
    pub(crate) fn new() -> Self {
        Self {
            pending: Vec::new(),
            base: 0,
            phase: Phase::Start,
            top_key: String::new(),
            header: None,
            header_cols: Vec::new(),
            row_names: Vec::new(),
            row_values: Vec::new(),
            current_key: None,
        }
    }

    pub(crate) fn parse_chunk(&mut self, chunk: &[u8]) -> Result<ChunkOutput, ParseError> {
        self.pending.extend_from_slice(chunk);
        self.drive(false)
    }

    pub(crate) fn finish(&mut self) -> Result<ChunkOutput, ParseError> {
        let output = self.drive(true)?;
        match self.phase {
            Phase::End => Ok(output),
            // an empty (or whitespace-only) stream yields no rows
            Phase::Start if self.pending.iter().all(|b| b.is_ascii_whitespace()) => Ok(output),
            _ => Err(ParseError::UnexpectedEof("JSON document")),
        }
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
                Ok(Step::Advance(next)) => pos = next,
                Ok(Step::Hold) => break Ok(()),
                Err(error) => break Err(error),
            }
        };
        self.base += pos;
        self.pending = buf[pos..].to_vec();
        result.map(|()| output)
    }

    fn step(
        &mut self,
        buf: &[u8],
        pos: usize,
        at_end: bool,
        output: &mut ChunkOutput,
    ) -> Result<Step, ParseError> {
        let (token, start, next) = match scan_token(buf, pos, at_end, self.base)? {
            Scan::Token { token, start, next } => (token, start, next),
            Scan::Incomplete | Scan::Empty => return Ok(Step::Hold),
        };

        match self.phase {
            Phase::Start => match token {
                Token::LBrace => {
                    self.phase = Phase::TopKey;
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "`{` to open the document", start)),
            },
            Phase::TopKey => match token {
                Token::Str(key) => {
                    self.top_key = key;
                    self.phase = Phase::TopColon;
                    Ok(Step::Advance(next))
                }
                Token::RBrace => {
                    self.phase = Phase::End;
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "a key or `}`", start)),
            },
            Phase::TopColon => match token {
                Token::Colon => {
                    self.phase = Phase::TopValue;
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "`:`", start)),
            },
            Phase::TopValue => match self.top_key.as_str() {
                "columns" => match token {
                    Token::LBracket => {
                        self.header_cols.clear();
                        self.phase = Phase::Columns;
                        Ok(Step::Advance(next))
                    }
                    other => Err(self.unexpected(&other, "`[` (`columns` must be an array)", start)),
                },
                "data" => match token {
                    Token::LBracket => {
                        self.phase = Phase::Rows;
                        Ok(Step::Advance(next))
                    }
                    other => Err(self.unexpected(&other, "`[` (`data` must be an array)", start)),
                },
                // any other top-level key: skip its value, nested or not
                _ => match token {
                    Token::Str(_) | Token::Literal(_) => {
                        self.phase = Phase::TopComma;
                        Ok(Step::Advance(next))
                    }
                    Token::LBrace | Token::LBracket => {
                        match complete_value_span(buf, start, at_end, self.base)? {
                            Some(end) => {
                                self.phase = Phase::TopComma;
                                Ok(Step::Advance(end))
                            }
                            None => Ok(Step::Hold),
                        }
                    }
                    other => Err(self.unexpected(&other, "a value", start)),
                },
            },
            Phase::Columns => match token {
                Token::Str(name) => {
                    self.header_cols.push(name);
                    self.phase = Phase::ColumnsComma;
                    Ok(Step::Advance(next))
                }
                Token::RBracket => {
                    self.finish_header(output);
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "a column name or `]`", start)),
            },
            Phase::ColumnsComma => match token {
                Token::Comma => {
                    self.phase = Phase::Columns;
                    Ok(Step::Advance(next))
                }
                Token::RBracket => {
                    self.finish_header(output);
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "`,` or `]`", start)),
            },
            Phase::Rows => match token {
                Token::LBracket => {
                    self.row_values.clear();
                    self.phase = Phase::ArrayRow;
                    Ok(Step::Advance(next))
                }
                Token::LBrace => {
                    self.row_names.clear();
                    self.row_values.clear();
                    self.phase = Phase::ObjectRowKey;
                    Ok(Step::Advance(next))
                }
                Token::RBracket => {
                    self.phase = Phase::TopComma;
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "a row (`[` or `{`) or `]`", start)),
            },
            Phase::RowsComma => match token {
                Token::Comma => {
                    self.phase = Phase::Rows;
                    Ok(Step::Advance(next))
                }
                Token::RBracket => {
                    self.phase = Phase::TopComma;
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "`,` or `]`", start)),
            },
            Phase::ArrayRow => match token {
                Token::RBracket => {
                    self.emit_array_row(output);
                    Ok(Step::Advance(next))
                }
                Token::Str(text) => {
                    self.row_values.push(FieldValue::Text(text));
                    self.phase = Phase::ArrayRowComma;
                    Ok(Step::Advance(next))
                }
                Token::Literal(text) => {
                    self.row_values.push(self.literal_value(&text, start)?);
                    self.phase = Phase::ArrayRowComma;
                    Ok(Step::Advance(next))
                }
                Token::LBrace | Token::LBracket => {
                    match self.capture_value(buf, start, at_end)? {
                        Some((value, end)) => {
                            self.row_values.push(value);
                            self.phase = Phase::ArrayRowComma;
                            Ok(Step::Advance(end))
                        }
                        None => Ok(Step::Hold),
                    }
                }
                other => Err(self.unexpected(&other, "a field value or `]`", start)),
            },
            Phase::ArrayRowComma => match token {
                Token::Comma => {
                    self.phase = Phase::ArrayRow;
                    Ok(Step::Advance(next))
                }
                Token::RBracket => {
                    self.emit_array_row(output);
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "`,` or `]`", start)),
            },
            Phase::ObjectRowKey => match token {
                Token::Str(key) => {
                    self.current_key = Some(key);
                    self.phase = Phase::ObjectRowColon;
                    Ok(Step::Advance(next))
                }
                Token::RBrace => {
                    self.emit_object_row(output);
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "a field name or `}`", start)),
            },
            Phase::ObjectRowColon => match token {
                Token::Colon => {
                    self.phase = Phase::ObjectRowValue;
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "`:`", start)),
            },
            Phase::ObjectRowValue => {
                let value = match token {
                    Token::Str(text) => Some((FieldValue::Text(text), next)),
                    Token::Literal(text) => Some((self.literal_value(&text, start)?, next)),
                    Token::LBrace | Token::LBracket => {
                        self.capture_value(buf, start, at_end)?
                    }
                    other => return Err(self.unexpected(&other, "a field value", start)),
                };
                match value {
                    Some((value, end)) => {
                        let key = self.current_key.take().unwrap_or_default();
                        self.row_names.push(key);
                        self.row_values.push(value);
                        self.phase = Phase::ObjectRowComma;
                        Ok(Step::Advance(end))
                    }
                    None => Ok(Step::Hold),
                }
            }
            Phase::ObjectRowComma => match token {
                Token::Comma => {
                    self.phase = Phase::ObjectRowKey;
                    Ok(Step::Advance(next))
                }
                Token::RBrace => {
                    self.emit_object_row(output);
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "`,` or `}`", start)),
            },
            Phase::TopComma => match token {
                Token::Comma => {
                    self.phase = Phase::TopKey;
                    Ok(Step::Advance(next))
                }
                Token::RBrace => {
                    self.phase = Phase::End;
                    Ok(Step::Advance(next))
                }
                other => Err(self.unexpected(&other, "`,` or `}`", start)),
            },
            Phase::End => Err(malformed(
                self.base + start,
                "trailing content after the document",
            )),
        }
    }

    fn finish_header(&mut self, output: &mut ChunkOutput) {
        let cols = std::mem::take(&mut self.header_cols);
        output.header = Some(cols.clone());
        self.header = Some(cols);
        self.phase = Phase::TopComma;
    }

    fn emit_array_row(&mut self, output: &mut ChunkOutput) {
        let values = std::mem::take(&mut self.row_values);
        if !values.is_empty() {
            output.rows.push(ParsedRow::positional(values));
        }
        self.phase = Phase::RowsComma;
    }

    fn emit_object_row(&mut self, output: &mut ChunkOutput) {
        let names = std::mem::take(&mut self.row_names);
        let values = std::mem::take(&mut self.row_values);
        if !values.is_empty() {
            output.rows.push(ParsedRow::named(names, values));
        }
        self.phase = Phase::RowsComma;
    }

    /// Captures a complete nested value verbatim as raw JSON text.
    fn capture_value(
        &self,
        buf: &[u8],
        start: usize,
        at_end: bool,
    ) -> Result<Option<(FieldValue, usize)>, ParseError> {
        let end = match complete_value_span(buf, start, at_end, self.base)? {
            Some(end) => end,
            None => return Ok(None),
        };
        let text = std::str::from_utf8(&buf[start..end])
            .map_err(|_| malformed(self.base + start, "nested value is not valid UTF-8"))?;
        serde_json::from_str::<serde_json::Value>(text)
            .map_err(|e| malformed(self.base + start, format!("invalid nested value: {e}")))?;
        Ok(Some((FieldValue::RawJson(text.to_string()), end)))
    }

    fn literal_value(&self, text: &str, start: usize) -> Result<FieldValue, ParseError> {
        match text {
            "null" => Ok(FieldValue::Null),
            "true" | "false" => Ok(FieldValue::Text(text.to_string())),
            _ if is_json_number(text) => Ok(FieldValue::Text(text.to_string())),
            _ => Err(malformed(
                self.base + start,
                format!("invalid literal `{text}`"),
            )),
        }
    }

    fn unexpected(&self, token: &Token, expected: &str, start: usize) -> ParseError {
        malformed(
            self.base + start,
            format!("unexpected {}, expected {}", token.describe(), expected),
        )
    }
}

fn malformed(offset: usize, message: impl Into<String>) -> ParseError {
    ParseError::Malformed {
        format: "json",
        message: format!("{} at byte {}", message.into(), offset),
    }
}

/// Strict JSON number grammar: optional minus, integer part without leading
/// zeros, optional fraction, optional exponent. Spellings `f64` would also
/// accept, like `-inf` or `1.`, are not numbers here.
fn is_json_number(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = usize::from(bytes.first() == Some(&b'-'));
    let integer = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == integer || (bytes[integer] == b'0' && i > integer + 1) {
        return false;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let fraction = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == fraction {
            return false;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exponent = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exponent {
            return false;
        }
    }
    i == bytes.len()
}

/// Scans the next token at `pos`. `at_end` lets a literal touching the end
/// of the buffer complete; mid-stream it might continue in the next chunk.
fn scan_token(buf: &[u8], mut pos: usize, at_end: bool, base: usize) -> Result<Scan, ParseError> {
    while pos < buf.len() && buf[pos].is_ascii_whitespace() {
        pos += 1;
    }
    if pos >= buf.len() {
        return Ok(Scan::Empty);
    }
    let start = pos;
    let token = match buf[pos] {
        b'{' => Token::LBrace,
        b'}' => Token::RBrace,
        b'[' => Token::LBracket,
        b']' => Token::RBracket,
        b':' => Token::Colon,
        b',' => Token::Comma,
        b'"' => return scan_string(buf, pos, base),
        b if is_literal_byte(b) => {
            let mut end = pos;
            while end < buf.len() && is_literal_byte(buf[end]) {
                end += 1;
            }
            if end == buf.len() && !at_end {
                return Ok(Scan::Incomplete);
            }
            // literal bytes are all ASCII
            let text = std::str::from_utf8(&buf[pos..end])
                .map_err(|_| malformed(base + pos, "literal is not valid UTF-8"))?;
            return Ok(Scan::Token {
                token: Token::Literal(text.to_string()),
                start,
                next: end,
            });
        }
        other => {
            return Err(malformed(
                base + pos,
                format!("unexpected byte 0x{other:02x}"),
            ));
        }
    };
    Ok(Scan::Token {
        token,
        start,
        next: pos + 1,
    })
}

fn is_literal_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'+' | b'.')
}

/// Scans a string token, decoding JSON escapes. Returns `Incomplete` until
/// the closing quote is in the buffer.
fn scan_string(buf: &[u8], start: usize, base: usize) -> Result<Scan, ParseError> {
    let mut out = String::new();
    let mut i = start + 1;
    loop {
        if i >= buf.len() {
            return Ok(Scan::Incomplete);
        }
        match buf[i] {
            b'"' => {
                return Ok(Scan::Token {
                    token: Token::Str(out),
                    start,
                    next: i + 1,
                });
            }
            b'\\' => {
                let Some(&escape) = buf.get(i + 1) else {
                    return Ok(Scan::Incomplete);
                };
                i += 2;
                match escape {
                    b'"' => out.push('"'),
                    b'\\' => out.push('\\'),
                    b'/' => out.push('/'),
                    b'b' => out.push('\u{0008}'),
                    b'f' => out.push('\u{000C}'),
                    b'n' => out.push('\n'),
                    b'r' => out.push('\r'),
                    b't' => out.push('\t'),
                    b'u' => {
                        if i + 4 > buf.len() {
                            return Ok(Scan::Incomplete);
                        }
                        let high = hex4(&buf[i..i + 4], base + i)?;
                        i += 4;
                        if (0xD800..=0xDBFF).contains(&high) {
                            // surrogate pair: the low half must follow
                            if i + 6 > buf.len() {
                                return Ok(Scan::Incomplete);
                            }
                            if buf[i] != b'\\' || buf[i + 1] != b'u' {
                                return Err(malformed(base + i, "expected low surrogate"));
                            }
                            let low = hex4(&buf[i + 2..i + 6], base + i + 2)?;
                            if !(0xDC00..=0xDFFF).contains(&low) {
                                return Err(malformed(base + i, "invalid low surrogate"));
                            }
                            i += 6;
                            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                            match char::from_u32(code) {
                                Some(c) => out.push(c),
                                None => {
                                    return Err(malformed(base + i, "invalid surrogate pair"));
                                }
                            }
                        } else {
                            match char::from_u32(high) {
                                Some(c) => out.push(c),
                                None => {
                                    return Err(malformed(base + i, "invalid unicode escape"));
                                }
                            }
                        }
                    }
                    other => {
                        return Err(malformed(
                            base + i,
                            format!("invalid string escape `\\{}`", other as char),
                        ));
                    }
                }
            }
            _ => {
                // raw run up to the next quote or backslash; the string is
                // only complete once its closing quote is here, so the run
                // is never cut mid-character when we decode it
                let run_start = i;
                while i < buf.len() && buf[i] != b'"' && buf[i] != b'\\' {
                    i += 1;
                }
                if i >= buf.len() {
                    return Ok(Scan::Incomplete);
                }
                let run = std::str::from_utf8(&buf[run_start..i])
                    .map_err(|_| malformed(base + run_start, "string is not valid UTF-8"))?;
                out.push_str(run);
            }
        }
    }
}

fn hex4(bytes: &[u8], offset: usize) -> Result<u32, ParseError> {
    let mut value = 0u32;
    for &b in bytes {
        let digit = match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'a'..=b'f' => u32::from(b - b'a') + 10,
            b'A'..=b'F' => u32::from(b - b'A') + 10,
            _ => return Err(malformed(offset, "invalid unicode escape")),
        };
        value = value * 16 + digit;
    }
    Ok(value)
}

/// Finds the end of the complete nested value opening at `start`, tracking
/// the bracket stack. Returns `None` while the value is still incomplete.
fn complete_value_span(
    buf: &[u8],
    start: usize,
    at_end: bool,
    base: usize,
) -> Result<Option<usize>, ParseError> {
    let mut stack: Vec<u8> = Vec::new();
    let mut pos = start;
    loop {
        let (token, token_start, next) = match scan_token(buf, pos, at_end, base)? {
            Scan::Token { token, start, next } => (token, start, next),
            Scan::Incomplete | Scan::Empty => return Ok(None),
        };
        match token {
            Token::LBrace => stack.push(b'}'),
            Token::LBracket => stack.push(b']'),
            Token::RBrace => {
                if stack.pop() != Some(b'}') {
                    return Err(malformed(base + token_start, "mismatched `}`"));
                }
            }
            Token::RBracket => {
                if stack.pop() != Some(b']') {
                    return Err(malformed(base + token_start, "mismatched `]`"));
                }
            }
            _ => {}
        }
        pos = next;
        if stack.is_empty() {
            return Ok(Some(pos));
        }
    }
}
