use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, SyntaxError, SyntaxErrorKind, UnterminatedQuote};
use crate::model::{KeyPattern, Pair, ParseState, QuoteChar};
use crate::source::LineSource;

const INLINE_COMMENT: &str = " #";

/// Result of running the line parser over a whole input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Parsed {
    /// Completed pairs in file order. Duplicate keys are kept.
    pub pairs: Vec<Pair>,
    /// Lines that were skipped.
    pub errors: Vec<SyntaxError>,
    /// A quoted value that was still open at end of input. Its pair is not in
    /// `pairs`.
    pub unterminated: Option<UnterminatedQuote>,
}

/// Parse dotenv pairs from UTF-8 text.
pub fn parse_str(input: &str) -> Parsed {
    parse_str_with_pattern(input, KeyPattern::Loose)
}

/// Parse dotenv pairs from UTF-8 text, validating keys with `key_pattern`.
pub fn parse_str_with_pattern(input: &str, key_pattern: KeyPattern) -> Parsed {
    parse_source(&LineSource::new(input), None, key_pattern)
}

/// Parse dotenv pairs from UTF-8 bytes.
pub fn parse_bytes(input: &[u8]) -> Result<Parsed, Error> {
    parse_bytes_with_pattern(input, KeyPattern::Loose)
}

/// Parse dotenv pairs from UTF-8 bytes, validating keys with `key_pattern`.
pub fn parse_bytes_with_pattern(input: &[u8], key_pattern: KeyPattern) -> Result<Parsed, Error> {
    let source = LineSource::from_bytes(input)?;
    Ok(parse_source(&source, None, key_pattern))
}

/// Parse dotenv pairs from a reader.
pub fn parse_reader<R: Read>(reader: R) -> Result<Parsed, Error> {
    parse_reader_with_pattern(reader, KeyPattern::Loose)
}

/// Parse dotenv pairs from a reader, validating keys with `key_pattern`.
pub fn parse_reader_with_pattern<R: Read>(
    reader: R,
    key_pattern: KeyPattern,
) -> Result<Parsed, Error> {
    let source = LineSource::from_reader(reader)?;
    Ok(parse_source(&source, None, key_pattern))
}

/// Feed every line of `source` through a fresh [`LineParser`], logging and
/// collecting the lines it rejects.
pub(crate) fn parse_source(
    source: &LineSource<'_>,
    path: Option<&Path>,
    key_pattern: KeyPattern,
) -> Parsed {
    let mut parser = LineParser::with_key_pattern(key_pattern).with_source(path);
    let mut parsed = Parsed::default();
    let origin = path.map(|path| path.display().to_string()).unwrap_or_default();

    for line in source.lines() {
        match parser.parse_line(line) {
            Ok(Some(pair)) => parsed.pairs.push(pair),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    file = %origin,
                    line = err.line,
                    content = %err.content,
                    "skipping malformed line: {}",
                    err.kind
                );
                parsed.errors.push(err);
            }
        }
    }

    if let Some(unterminated) = parser.finish() {
        tracing::warn!(
            file = %origin,
            line = unterminated.line,
            key = %unterminated.key,
            "discarding unterminated quoted value"
        );
        parsed.unterminated = Some(unterminated);
    }

    parsed
}

/// Line-at-a-time dotenv state machine.
///
/// Outside quotes every line is a blank line, a comment or an assignment. A
/// quoted value whose closing quote is not on the same line keeps the parser
/// in the quoted state until a line ending with that quote arrives.
#[derive(Debug, Clone, Default)]
pub struct LineParser {
    state: ParseState,
    key_pattern: KeyPattern,
    line: u32,
    source: Option<PathBuf>,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_pattern(key_pattern: KeyPattern) -> Self {
        Self {
            key_pattern,
            ..Self::default()
        }
    }

    /// Attach the file the lines come from; it is recorded on every pair.
    pub fn with_source(mut self, path: Option<&Path>) -> Self {
        self.source = path.map(Path::to_path_buf);
        self
    }

    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Number of physical lines consumed so far.
    pub fn lines_read(&self) -> u32 {
        self.line
    }

    /// Consume one physical line (`\n`-normalized, terminator included).
    ///
    /// Returns a pair once an entry is complete. A [`SyntaxError`] rejects only
    /// this line; the parser stays usable.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<Pair>, SyntaxError> {
        self.line += 1;
        match self.state.quote {
            Some(quote) => Ok(self.continue_quoted(line, quote)),
            None => self.scan(line),
        }
    }

    /// End the input. Reports a quoted value that never closed.
    pub fn finish(self) -> Option<UnterminatedQuote> {
        if !self.state.in_quotes() {
            return None;
        }

        Some(UnterminatedQuote {
            key: self.state.pending_key,
            line: self.state.pending_line,
            path: self.source,
        })
    }

    fn scan(&mut self, line: &str) -> Result<Option<Pair>, SyntaxError> {
        let line_num = self.line;
        let working = line.trim_start();
        if working.is_empty() || working.starts_with('#') {
            return Ok(None);
        }

        let Some(eq_idx) = working.find('=') else {
            return Err(SyntaxError::new(
                line_num,
                SyntaxErrorKind::MissingEquals,
                line,
            ));
        };

        let key = working[..eq_idx].trim();
        if !self.key_pattern.matches(key) {
            return Err(SyntaxError::new(line_num, SyntaxErrorKind::InvalidKey, line));
        }

        let after_eq = working[eq_idx + 1..].trim_start();
        let rest = after_eq.trim_end();
        if rest.is_empty() {
            return Ok(Some(self.pair(key, String::new(), line_num)));
        }

        let Some(quote) = rest.chars().next().and_then(QuoteChar::from_char) else {
            let value = match rest.find(INLINE_COMMENT) {
                Some(marker) => rest[..marker].trim_end(),
                None => rest,
            };
            return Ok(Some(self.pair(key, value.to_owned(), line_num)));
        };

        let quote_char = quote.as_char();
        if rest.len() >= 2 && rest.ends_with(quote_char) {
            let inner = &rest[1..rest.len() - 1];
            return Ok(Some(self.pair(key, inner.to_owned(), line_num)));
        }

        // `"value" # comment`: everything between the opening quote and the
        // marker is the value, closing quote and padding included.
        if let Some(marker) = rest.find(INLINE_COMMENT) {
            return Ok(Some(self.pair(key, rest[1..marker].to_owned(), line_num)));
        }

        self.state.open(quote, key, &after_eq[1..], line_num);
        Ok(None)
    }

    fn continue_quoted(&mut self, line: &str, quote: QuoteChar) -> Option<Pair> {
        let Some(body) = line.trim_end().strip_suffix(quote.as_char()) else {
            self.state.pending_value.push_str(line);
            return None;
        };

        self.state.pending_value.push_str(body);
        let (key, raw, line_num) = self.state.take();
        Some(Pair {
            key,
            raw,
            source: self.source.clone(),
            line: line_num,
        })
    }

    fn pair(&self, key: &str, raw: String, line: u32) -> Pair {
        Pair {
            key: key.to_owned(),
            raw,
            source: self.source.clone(),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(parsed: &Parsed) -> Vec<(&str, &str)> {
        parsed
            .pairs
            .iter()
            .map(|pair| (pair.key.as_str(), pair.raw.as_str()))
            .collect()
    }

    #[test]
    fn parses_basic_values_and_comments() {
        let parsed = parse_str("A=1\nB = 2\n# skip\n   # indented skip\nC=hello # comment\nD=\n");

        assert!(parsed.errors.is_empty());
        assert_eq!(
            values(&parsed),
            [("A", "1"), ("B", "2"), ("C", "hello"), ("D", "")]
        );
    }

    #[test]
    fn unquoted_values_are_trimmed_verbatim() {
        let parsed = parse_str("URL =  https://example.com/a?b=c&d=e   \nHASH=abc#def\n");

        assert_eq!(
            values(&parsed),
            [("URL", "https://example.com/a?b=c&d=e"), ("HASH", "abc#def")]
        );
    }

    #[test]
    fn single_line_quotes_keep_inner_content() {
        let parsed = parse_str(
            "SINGLE='it has \"inner\" quotes'\nDOUBLE=\"it's fine\"\nSPACED=\"  padded  \"\nEMPTY=\"\"\n",
        );

        assert_eq!(
            values(&parsed),
            [
                ("SINGLE", "it has \"inner\" quotes"),
                ("DOUBLE", "it's fine"),
                ("SPACED", "  padded  "),
                ("EMPTY", ""),
            ]
        );
    }

    #[test]
    fn quoted_value_with_inline_comment_keeps_text_up_to_marker() {
        let parsed = parse_str(
            "A=\"quoted value\" # note\nB='single' # note\nPAD=\"a  # c\nMIXED=\"v' # c\n",
        );

        assert_eq!(
            values(&parsed),
            [
                ("A", "quoted value\""),
                ("B", "single'"),
                ("PAD", "a "),
                ("MIXED", "v'"),
            ]
        );
        assert!(parsed.unterminated.is_none());
    }

    #[test]
    fn quoted_values_keep_escapes_raw() {
        let parsed = parse_str("A=\"line\\nvalue\"\nB='cost \\$5'\n");

        assert_eq!(values(&parsed), [("A", "line\\nvalue"), ("B", "cost \\$5")]);
    }

    #[test]
    fn parses_multiline_quoted_values() {
        let input = "MULTI_DOUBLE=\"THIS\nIS\nA\nMULTILINE\nSTRING\"\n\
                     MULTI_SINGLE='THIS\nIS\nA\nMULTILINE\nSTRING'\n\
                     AFTER=after\n";
        let parsed = parse_str(input);

        assert_eq!(
            values(&parsed),
            [
                ("MULTI_DOUBLE", "THIS\nIS\nA\nMULTILINE\nSTRING"),
                ("MULTI_SINGLE", "THIS\nIS\nA\nMULTILINE\nSTRING"),
                ("AFTER", "after"),
            ]
        );
        assert_eq!(parsed.pairs[0].line, 1);
        assert_eq!(parsed.pairs[1].line, 6);
        assert_eq!(parsed.pairs[2].line, 11);
    }

    #[test]
    fn multiline_value_keeps_continuation_lines_untrimmed() {
        let parsed = parse_str("KEY=\"line1  \n   line2 \nline3\"   \n");

        assert_eq!(values(&parsed), [("KEY", "line1  \n   line2 \nline3")]);
    }

    #[test]
    fn multiline_value_keeps_opposite_quotes_and_comments() {
        let parsed = parse_str("PEM='-----BEGIN-----\n# not a comment\n\"quoted\" line\n-----END-----'\n");

        assert_eq!(
            values(&parsed),
            [("PEM", "-----BEGIN-----\n# not a comment\n\"quoted\" line\n-----END-----")]
        );
    }

    #[test]
    fn lone_opening_quote_starts_multiline_value() {
        let parsed = parse_str("KEY=\"\nbody\n\"\n");

        assert_eq!(values(&parsed), [("KEY", "\nbody\n")]);
    }

    #[test]
    fn crlf_input_is_normalized_before_parsing() {
        let parsed = parse_str("A=\"line1\r\nline2\"\r\nB=ok\r\n");

        assert_eq!(values(&parsed), [("A", "line1\nline2"), ("B", "ok")]);
    }

    #[test]
    fn missing_equals_is_recoverable() {
        let parsed = parse_str("A=ok\nBAD LINE\nB=still\n");

        assert_eq!(values(&parsed), [("A", "ok"), ("B", "still")]);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].kind, SyntaxErrorKind::MissingEquals);
        assert_eq!(parsed.errors[0].line, 2);
        assert_eq!(parsed.errors[0].content, "BAD LINE");
    }

    #[test]
    fn invalid_keys_are_recoverable() {
        let parsed = parse_str("123INVALID=1\nkebab-case=2\ndot.notation=3\n=4\nmixedCase=5\n");

        assert_eq!(values(&parsed), [("mixedCase", "5")]);
        assert_eq!(parsed.errors.len(), 4);
        assert!(
            parsed
                .errors
                .iter()
                .all(|err| err.kind == SyntaxErrorKind::InvalidKey)
        );
    }

    #[test]
    fn strict_pattern_rejects_lowercase_keys() {
        let parsed = parse_str_with_pattern("mixedCase=1\nUPPER=2\n", KeyPattern::Strict);

        assert_eq!(values(&parsed), [("UPPER", "2")]);
        assert_eq!(parsed.errors[0].kind, SyntaxErrorKind::InvalidKey);
    }

    #[test]
    fn unterminated_quote_discards_pending_pair() {
        let parsed = parse_str("A=1\nB=\"never\nclosed\n");

        assert_eq!(values(&parsed), [("A", "1")]);
        let unterminated = parsed.unterminated.expect("expected unterminated quote");
        assert_eq!(unterminated.key, "B");
        assert_eq!(unterminated.line, 2);
    }

    #[test]
    fn duplicate_keys_are_kept_in_order() {
        let parsed = parse_str("A=1\nA=2\n");

        assert_eq!(values(&parsed), [("A", "1"), ("A", "2")]);
    }

    #[test]
    fn parses_unicode_values() {
        let parsed = parse_str("GREETING=こんにちは\n");

        assert_eq!(values(&parsed), [("GREETING", "こんにちは")]);
    }

    #[test]
    fn line_parser_tracks_state_between_calls() {
        let mut parser = LineParser::new();

        assert_eq!(parser.parse_line("KEY=\"line1\n"), Ok(None));
        assert!(parser.state().in_quotes());
        assert_eq!(parser.state().quote(), Some(QuoteChar::Double));
        assert_eq!(parser.state().pending_key(), "KEY");
        assert_eq!(parser.state().pending_value(), "line1\n");

        assert_eq!(parser.parse_line("line2\n"), Ok(None));
        let pair = parser
            .parse_line("line3\"\n")
            .expect("line should parse")
            .expect("value should be complete");

        assert_eq!(pair.key, "KEY");
        assert_eq!(pair.raw, "line1\nline2\nline3");
        assert_eq!(parser.state(), &ParseState::new());
        assert_eq!(parser.lines_read(), 3);
        assert!(parser.finish().is_none());
    }

    #[test]
    fn parse_reader_reads_everything() {
        let reader = std::io::Cursor::new("KEY_ONE=1\nKEY_TWO='2'\n");
        let parsed = parse_reader(reader).expect("parse should succeed");

        assert_eq!(values(&parsed), [("KEY_ONE", "1"), ("KEY_TWO", "2")]);
    }

    #[test]
    fn parse_bytes_rejects_invalid_utf8() {
        let err = parse_bytes(b"A=\xff\n").expect_err("expected encoding error");
        assert!(matches!(err, Error::InvalidEncoding { .. }));
    }
}
