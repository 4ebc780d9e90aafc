//! Delimiter-aware record tokenizer.
//!
//! Splits one physical line into fields. A delimiter inside a quoted span is data, not a split
//! point:
//!
//! ```rust
//! use tabload::tokenizer::RecordTokenizer;
//!
//! let tok = RecordTokenizer::new(',');
//! assert_eq!(tok.split(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
//! ```

use crate::types::Row;

/// Splits lines into fields for one input file.
///
/// The header line and every data line of a file must go through the same tokenizer so that
/// column positions stay aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTokenizer {
    delimiter: char,
    single_quotes: bool,
}

impl RecordTokenizer {
    /// Tokenizer splitting on `delimiter`, honoring `"…"` spans.
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            single_quotes: false,
        }
    }

    /// Also treat `'…'` as a quoted span.
    pub fn with_single_quotes(mut self, enabled: bool) -> Self {
        self.single_quotes = enabled;
        self
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    fn is_quote(&self, c: char) -> bool {
        c == '"' || (self.single_quotes && c == '\'')
    }

    /// Split `line` into fields.
    ///
    /// Rules:
    ///
    /// - A quote opens a span only at the start of a field (leading blanks are dropped); the
    ///   enclosing quotes are removed.
    /// - Inside a span, a doubled quote is one literal quote character.
    /// - An unterminated span runs to the end of the line.
    /// - A field consisting of exactly one space becomes the empty string.
    pub fn split(&self, line: &str) -> Row {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut open_quote: Option<char> = None;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            match open_quote {
                Some(q) if c == q => {
                    if chars.peek() == Some(&q) {
                        current.push(q);
                        chars.next();
                    } else {
                        open_quote = None;
                    }
                }
                Some(_) => current.push(c),
                None if c == self.delimiter => fields.push(normalize(std::mem::take(&mut current))),
                None if self.is_quote(c) && current.trim().is_empty() => {
                    current.clear();
                    open_quote = Some(c);
                }
                None => current.push(c),
            }
        }
        fields.push(normalize(current));
        fields
    }
}

fn normalize(field: String) -> String {
    if field == " " { String::new() } else { field }
}

#[cfg(test)]
mod tests {
    use super::RecordTokenizer;

    #[test]
    fn embedded_delimiter_inside_quotes_is_not_a_split_point() {
        let tok = RecordTokenizer::new(',');
        assert_eq!(tok.split(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
    }

    #[test]
    fn lone_space_becomes_empty() {
        let tok = RecordTokenizer::new('~');
        assert_eq!(tok.split("x~ ~  ~"), vec!["x", "", "  ", ""]);
    }

    #[test]
    fn doubled_quote_inside_span_is_literal() {
        let tok = RecordTokenizer::new(',');
        assert_eq!(tok.split(r#""say ""hi""",2"#), vec![r#"say "hi""#, "2"]);
    }

    #[test]
    fn quote_in_middle_of_field_is_data() {
        let tok = RecordTokenizer::new(',').with_single_quotes(true);
        assert_eq!(tok.split("O'Brien,5"), vec!["O'Brien", "5"]);
    }

    #[test]
    fn single_quotes_are_opt_in() {
        let plain = RecordTokenizer::new(',');
        assert_eq!(plain.split("'a,b',c"), vec!["'a", "b'", "c"]);

        let quoted = RecordTokenizer::new(',').with_single_quotes(true);
        assert_eq!(quoted.split("'a,b',c"), vec!["a,b", "c"]);
    }

    #[test]
    fn unterminated_quote_runs_to_end_of_line() {
        let tok = RecordTokenizer::new(',');
        assert_eq!(tok.split(r#"1,"open,tail"#), vec!["1", "open,tail"]);
    }

    #[test]
    fn tab_delimiter_and_trailing_empty_field() {
        let tok = RecordTokenizer::new('\t');
        assert_eq!(tok.split("a\tb\t"), vec!["a", "b", ""]);
    }
}
