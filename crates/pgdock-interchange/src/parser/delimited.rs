//! CSV/TSV parser.
//!
//! Quote-aware: fields may be wrapped in double quotes, `""` inside a quoted
//! field is a literal quote, and a quoted field may span line breaks. Rows
//! end at a newline outside quotes; a trailing `\r` before the newline is
//! dropped so CRLF input parses the same as LF.

use pgdock_core::{FieldValue, ParsedRow};

use super::{ChunkOutput, ParseError};

#[derive(Debug)]
pub(crate) struct DelimitedState {
    delimiter: u8,
    format: &'static str,
    use_header: bool,
    header: Option<Vec<String>>,
    pending: Vec<u8>,
}

impl DelimitedState {
    pub(crate) fn new(delimiter: u8, format: &'static str, use_header: bool) -> Self {
        Self {
            delimiter,
            format,
            use_header,
            header: None,
            pending: Vec::new(),
        }
    }

    pub(crate) fn parse_chunk(&mut self, chunk: &[u8]) -> Result<ChunkOutput, ParseError> {
        self.pending.extend_from_slice(chunk);

        // find complete row boundaries first; an open quote at the end of the
        // buffer (or a quote whose follower is not here yet) leaves the row
        // pending
        let mut boundaries = Vec::new();
        let mut start = 0;
        let mut in_quotes = false;
        let mut i = 0;
        while i < self.pending.len() {
            let b = self.pending[i];
            if in_quotes {
                if b == b'"' {
                    match self.pending.get(i + 1) {
                        Some(b'"') => i += 2,
                        Some(_) => {
                            in_quotes = false;
                            i += 1;
                        }
                        // closing quote or escaped pair? undecidable until
                        // the next byte arrives
                        None => break,
                    }
                } else {
                    i += 1;
                }
            } else if b == b'"' {
                in_quotes = true;
                i += 1;
            } else if b == b'\n' {
                boundaries.push((start, i));
                i += 1;
                start = i;
            } else {
                i += 1;
            }
        }

        let mut output = ChunkOutput::default();
        for (row_start, row_end) in boundaries {
            let mut line = &self.pending[row_start..row_end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if line.is_empty() {
                continue;
            }
            let fields = split_fields(line, self.delimiter, self.format)?;
            self.emit(fields, &mut output);
        }
        self.pending.drain(..start);
        Ok(output)
    }

    pub(crate) fn finish(&mut self) -> Result<ChunkOutput, ParseError> {
        let mut output = ChunkOutput::default();
        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            return Ok(output);
        }
        // an unterminated quoted field surfaces here as an error
        let fields = split_fields(&line, self.delimiter, self.format)?;
        self.emit(fields, &mut output);
        Ok(output)
    }

    fn emit(&mut self, fields: Vec<String>, output: &mut ChunkOutput) {
        if self.use_header && self.header.is_none() {
            self.header = Some(fields.clone());
            output.header = Some(fields);
        } else {
            let values = fields.into_iter().map(FieldValue::Text).collect();
            output.rows.push(ParsedRow::positional(values));
        }
    }

    pub(crate) fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub(crate) fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }
}

fn split_fields(line: &[u8], delimiter: u8, format: &'static str) -> Result<Vec<String>, ParseError> {
    let mut fields = Vec::new();
    let mut field = Vec::new();
    let mut in_quotes = false;
    let mut i = 0;
    while i < line.len() {
        let b = line[i];
        if in_quotes {
            if b == b'"' {
                if line.get(i + 1) == Some(&b'"') {
                    field.push(b'"');
                    i += 2;
                } else {
                    in_quotes = false;
                    i += 1;
                }
            } else {
                field.push(b);
                i += 1;
            }
        } else if b == b'"' {
            in_quotes = true;
            i += 1;
        } else if b == delimiter {
            fields.push(take_field(&mut field, format)?);
            i += 1;
        } else {
            field.push(b);
            i += 1;
        }
    }
    if in_quotes {
        return Err(ParseError::UnexpectedEof("quoted field"));
    }
    fields.push(take_field(&mut field, format)?);
    Ok(fields)
}

fn take_field(buf: &mut Vec<u8>, format: &'static str) -> Result<String, ParseError> {
    String::from_utf8(std::mem::take(buf)).map_err(|_| ParseError::Malformed {
        format,
        message: "field is not valid UTF-8".to_string(),
    })
}
