//! Tests for the chunk-incremental parsers.

use super::*;
use crate::options::ImportFormat;
use pgdock_core::FieldValue;

fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.to_string())
}

/// Feeds `chunks` in order, then finishes, collecting rows and the header.
fn collect_chunks(
    format: ImportFormat,
    use_header: bool,
    chunks: &[&[u8]],
) -> (Vec<ParsedRow>, Option<Vec<String>>) {
    let mut state = ParserState::new(format, use_header);
    let mut rows = Vec::new();
    let mut header = None;
    for chunk in chunks {
        let out = state.parse_chunk(chunk).unwrap();
        rows.extend(out.rows);
        if out.header.is_some() {
            header = out.header;
        }
    }
    let out = state.finish().unwrap();
    rows.extend(out.rows);
    if out.header.is_some() {
        header = out.header;
    }
    (rows, header)
}

fn parse_chunks(
    format: ImportFormat,
    use_header: bool,
    chunks: &[&str],
) -> (Vec<ParsedRow>, Option<Vec<String>>) {
    let bytes: Vec<&[u8]> = chunks.iter().map(|c| c.as_bytes()).collect();
    collect_chunks(format, use_header, &bytes)
}

/// Chunk boundaries must never change the parse: whole-input, byte-at-a-time,
/// and a handful of two-chunk splits all have to agree.
fn assert_chunking_invariant(format: ImportFormat, use_header: bool, input: &str) {
    let bytes = input.as_bytes();
    let whole = collect_chunks(format, use_header, &[bytes]);

    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    let byte_at_a_time = collect_chunks(format, use_header, &singles);
    assert_eq!(byte_at_a_time, whole, "byte-at-a-time parse differs");

    for split in [1, bytes.len() / 3, bytes.len() / 2, bytes.len() - 1] {
        if split == 0 || split >= bytes.len() {
            continue;
        }
        let halves = collect_chunks(format, use_header, &[&bytes[..split], &bytes[split..]]);
        assert_eq!(halves, whole, "split at {split} differs");
    }
}

mod delimited_tests {
    use super::*;

    #[test]
    fn test_row_split_across_chunks() {
        let mut state = ParserState::new(ImportFormat::Csv, false);

        let out = state.parse_chunk(b"1,Alice\n2,Bobb").unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].values(), &[text("1"), text("Alice")]);
        assert_eq!(state.pending(), b"2,Bobb");

        let out = state.parse_chunk(b"y\n").unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].values(), &[text("2"), text("Bobby")]);
        assert!(state.pending().is_empty());
    }

    #[test]
    fn test_header_mode_reads_first_row_as_names() {
        let (rows, header) = parse_chunks(ImportFormat::Csv, true, &["id,name\n1,Alice\n"]);
        assert_eq!(header, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values(), &[text("1"), text("Alice")]);
    }

    #[test]
    fn test_quoted_fields() {
        let (rows, _) = parse_chunks(
            ImportFormat::Csv,
            false,
            &["\"a,b\",c\n\"say \"\"hi\"\"\",d\n"],
        );
        assert_eq!(rows[0].values(), &[text("a,b"), text("c")]);
        assert_eq!(rows[1].values(), &[text("say \"hi\""), text("d")]);
    }

    #[test]
    fn test_quoted_field_spans_lines() {
        let (rows, _) = parse_chunks(ImportFormat::Csv, false, &["1,\"multi\nline\"\n2,x\n"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values(), &[text("1"), text("multi\nline")]);
        assert_eq!(rows[1].values(), &[text("2"), text("x")]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let (rows, _) = parse_chunks(ImportFormat::Csv, false, &["a,b\r\nc,d\r\n"]);
        assert_eq!(rows[0].values(), &[text("a"), text("b")]);
        assert_eq!(rows[1].values(), &[text("c"), text("d")]);
    }

    #[test]
    fn test_final_line_without_newline_flushes_at_finish() {
        let mut state = ParserState::new(ImportFormat::Csv, false);
        let out = state.parse_chunk(b"a,b\nc,d").unwrap();
        assert_eq!(out.rows.len(), 1);
        let out = state.finish().unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].values(), &[text("c"), text("d")]);
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let (rows, _) = parse_chunks(ImportFormat::Csv, false, &["a\n\n\nb\n"]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_unterminated_quote_fails_at_finish() {
        let mut state = ParserState::new(ImportFormat::Csv, false);
        state.parse_chunk(b"1,\"open").unwrap();
        let err = state.finish().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof("quoted field")));
    }

    #[test]
    fn test_tsv_delimiter() {
        let (rows, _) = parse_chunks(ImportFormat::Tsv, false, &["a\tb\nc\td\n"]);
        assert_eq!(rows[0].values(), &[text("a"), text("b")]);
        assert_eq!(rows[1].values(), &[text("c"), text("d")]);
    }

    #[test]
    fn test_chunking_invariance() {
        assert_chunking_invariant(
            ImportFormat::Csv,
            true,
            "id,name\n1,\"Ali\nce\"\r\n2,\"say \"\"hi\"\"\"\n3,héé\n4,last",
        );
    }
}

mod json_tests {
    use super::*;

    #[test]
    fn test_columns_and_array_rows() {
        let input = r#"{"columns": ["id", "name"], "data": [[1, "Alice"], [2, null]]}"#;
        let (rows, header) = parse_chunks(ImportFormat::Json, true, &[input]);
        assert_eq!(header, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values(), &[text("1"), text("Alice")]);
        assert_eq!(rows[1].values(), &[text("2"), FieldValue::Null]);
    }

    #[test]
    fn test_object_rows_carry_names() {
        let input = r#"{"data": [{"id": 1, "name": "A"}]}"#;
        let (rows, _) = parse_chunks(ImportFormat::Json, true, &[input]);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].names(),
            Some(&["id".to_string(), "name".to_string()][..])
        );
        assert_eq!(rows[0].values(), &[text("1"), text("A")]);
    }

    #[test]
    fn test_nested_values_kept_as_raw_json() {
        let input = r#"{"data": [[1, {"tags": [1, 2], "s": "x"}]]}"#;
        let (rows, _) = parse_chunks(ImportFormat::Json, true, &[input]);
        assert_eq!(
            rows[0].values()[1],
            FieldValue::RawJson(r#"{"tags": [1, 2], "s": "x"}"#.to_string())
        );
    }

    #[test]
    fn test_scalar_literals() {
        let input = r#"{"data": [[1.5, true, false, null, "x"]]}"#;
        let (rows, _) = parse_chunks(ImportFormat::Json, true, &[input]);
        assert_eq!(
            rows[0].values(),
            &[
                text("1.5"),
                text("true"),
                text("false"),
                FieldValue::Null,
                text("x")
            ]
        );
    }

    #[test]
    fn test_unknown_top_level_keys_are_skipped() {
        let input = r#"{"meta": {"version": 1}, "data": [[1]], "extra": [3, {"k": 4}], "n": 7}"#;
        let (rows, header) = parse_chunks(ImportFormat::Json, true, &[input]);
        assert!(header.is_none());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values(), &[text("1")]);
    }

    #[test]
    fn test_string_escapes_are_decoded() {
        let input = r#"{"data": [["a\nb", "A", "😀", "q\"\\w"]]}"#;
        let (rows, _) = parse_chunks(ImportFormat::Json, true, &[input]);
        assert_eq!(
            rows[0].values(),
            &[text("a\nb"), text("A"), text("\u{1F600}"), text("q\"\\w")]
        );
    }

    #[test]
    fn test_invalid_literal_is_rejected() {
        let mut state = ParserState::new(ImportFormat::Json, true);
        let err = state.parse_chunk(br#"{"data": [[nul]]}"#).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { format: "json", .. }));
    }

    /// Rust's float parser also reads `inf`, `nan`, leading zeros, and bare
    /// trailing dots; none of those are JSON numbers.
    #[test]
    fn test_non_json_number_spellings_are_rejected() {
        for body in [
            r#"{"data": [[-inf]]}"#,
            r#"{"data": [[-infinity]]}"#,
            r#"{"data": [[-nan]]}"#,
            r#"{"data": [[01]]}"#,
            r#"{"data": [[1.]]}"#,
        ] {
            let mut state = ParserState::new(ImportFormat::Json, true);
            let result = state.parse_chunk(body.as_bytes());
            assert!(
                matches!(result, Err(ParseError::Malformed { format: "json", .. })),
                "accepted `{body}`"
            );
        }
    }

    #[test]
    fn test_exponent_and_signed_number_forms() {
        let input = r#"{"data": [[0, -0.5, 1e3, 2E+10, -7.25e-2]]}"#;
        let (rows, _) = parse_chunks(ImportFormat::Json, true, &[input]);
        assert_eq!(
            rows[0].values(),
            &[
                text("0"),
                text("-0.5"),
                text("1e3"),
                text("2E+10"),
                text("-7.25e-2")
            ]
        );
    }

    #[test]
    fn test_mismatched_bracket_in_nested_value() {
        let mut state = ParserState::new(ImportFormat::Json, true);
        let err = state.parse_chunk(br#"{"data": [[{"a": 1]]]}"#).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { format: "json", .. }));
    }

    #[test]
    fn test_truncated_document_fails_at_finish() {
        let mut state = ParserState::new(ImportFormat::Json, true);
        state.parse_chunk(br#"{"data": [[1,"#).unwrap();
        let err = state.finish().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof("JSON document")));
    }

    #[test]
    fn test_trailing_content_is_rejected() {
        let mut state = ParserState::new(ImportFormat::Json, true);
        state.parse_chunk(br#"{"data": []} x"#).unwrap();
        assert!(state.finish().is_err());
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let (rows, header) = parse_chunks(ImportFormat::Json, true, &["  \n "]);
        assert!(rows.is_empty());
        assert!(header.is_none());
    }

    #[test]
    fn test_chunking_invariance() {
        assert_chunking_invariant(
            ImportFormat::Json,
            true,
            concat!(
                r#"{"columns": ["id", "data"],"#,
                "\n",
                r#" "data": [[1, {"a": [1, 2], "s": "x\ny"}], [2, "é😀"], [3, null]],"#,
                "\n",
                r#" "meta": {"nested": [{}]}}"#
            ),
        );
    }
}

mod xml_tests {
    use super::*;

    #[test]
    fn test_header_and_rows() {
        let input = concat!(
            "<table>",
            "<header><col name=\"id\"/><col name=\"name\"/></header>",
            "<row><col name=\"id\">1</col><col name=\"name\">Alice</col></row>",
            "</table>"
        );
        let (rows, header) = parse_chunks(ImportFormat::Xml, true, &[input]);
        assert_eq!(header, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].names(),
            Some(&["id".to_string(), "name".to_string()][..])
        );
        assert_eq!(rows[0].values(), &[text("1"), text("Alice")]);
    }

    #[test]
    fn test_is_null_attribute() {
        let input = concat!(
            "<row>",
            "<col name=\"a\" isNull=\"true\"/>",
            "<col name=\"b\" isNull=\"1\">ignored</col>",
            "<col name=\"c\" isNull=\"false\">x</col>",
            "</row>"
        );
        let (rows, _) = parse_chunks(ImportFormat::Xml, true, &[input]);
        assert_eq!(
            rows[0].values(),
            &[FieldValue::Null, FieldValue::Null, text("x")]
        );
    }

    #[test]
    fn test_entities_are_decoded() {
        let input = "<row><col name=\"a\">a &amp; b &lt;t&gt; &#65;&#x42; &unknown;</col></row>";
        let (rows, _) = parse_chunks(ImportFormat::Xml, true, &[input]);
        assert_eq!(rows[0].values(), &[text("a & b <t> AB &unknown;")]);
    }

    #[test]
    fn test_cdata_is_verbatim() {
        let input = "<row><col name=\"a\"><![CDATA[raw & <keep> \"this\"]]></col></row>";
        let (rows, _) = parse_chunks(ImportFormat::Xml, true, &[input]);
        assert_eq!(rows[0].values(), &[text("raw & <keep> \"this\"")]);
    }

    #[test]
    fn test_cdata_close_marker_split_across_chunks() {
        let (rows, _) = parse_chunks(
            ImportFormat::Xml,
            true,
            &["<row><col name=\"a\"><![CDATA[AB]]", "CD]]></col></row>"],
        );
        assert_eq!(rows[0].values(), &[text("AB]]CD")]);
    }

    #[test]
    fn test_unnamed_cols_fall_back_to_positional() {
        let input = "<row><col>1</col><col>2</col></row>";
        let (rows, _) = parse_chunks(ImportFormat::Xml, true, &[input]);
        assert!(rows[0].names().is_none());
        assert_eq!(rows[0].values(), &[text("1"), text("2")]);
    }

    #[test]
    fn test_self_closing_col_without_is_null_is_empty_text() {
        let input = "<row><col name=\"a\"/></row>";
        let (rows, _) = parse_chunks(ImportFormat::Xml, true, &[input]);
        assert_eq!(rows[0].values(), &[text("")]);
    }

    #[test]
    fn test_declarations_and_comments_are_ignored() {
        let input = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
            "<!-- an export -->",
            "<table><row><col name=\"a\">1</col></row></table>"
        );
        let (rows, _) = parse_chunks(ImportFormat::Xml, true, &[input]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_truncated_row_fails_at_finish() {
        let mut state = ParserState::new(ImportFormat::Xml, true);
        state.parse_chunk(b"<row><col name=\"a\">x").unwrap();
        let err = state.finish().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof(_)));
    }

    #[test]
    fn test_chunking_invariance() {
        assert_chunking_invariant(
            ImportFormat::Xml,
            true,
            concat!(
                "<?xml version=\"1.0\"?><table>",
                "<header><col name=\"id\"/><col name=\"note\"/></header>",
                "<row><col name=\"id\">1</col>",
                "<col name=\"note\"><![CDATA[é😀 ]] raw]]></col></row>",
                "<row><col name=\"id\" isNull=\"yes\"/><col name=\"note\">&amp;é</col></row>",
                "</table>"
            ),
        );
    }
}

mod state_tests {
    use super::*;

    #[test]
    fn test_pending_exposes_remainder() {
        let mut state = ParserState::new(ImportFormat::Csv, false);
        state.parse_chunk(b"1,Al").unwrap();
        assert_eq!(state.pending(), b"1,Al");
    }

    #[test]
    fn test_header_accessor_tracks_parsed_header() {
        let mut state = ParserState::new(ImportFormat::Csv, true);
        assert!(state.header().is_none());
        state.parse_chunk(b"id,name\n").unwrap();
        assert_eq!(
            state.header(),
            Some(&["id".to_string(), "name".to_string()][..])
        );
    }
}
