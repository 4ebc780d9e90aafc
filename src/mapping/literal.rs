//! SQL literal construction.
//!
//! Bulk statements are plain text, so every value that came from input data goes through
//! [`quote_literal`] before it is spliced into a value-list.

use std::borrow::Cow;

/// Double every single quote so `raw` can sit inside a `'…'` literal.
pub fn escape_literal(raw: &str) -> Cow<'_, str> {
    if raw.contains('\'') {
        Cow::Owned(raw.replace('\'', "''"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Render `raw` as a quoted SQL string literal.
pub fn quote_literal(raw: &str) -> String {
    let escaped = escape_literal(raw);
    let mut out = String::with_capacity(escaped.len() + 2);
    out.push('\'');
    out.push_str(&escaped);
    out.push('\'');
    out
}

/// Comma-separated list of already-rendered SQL fragments: one row of a multi-row insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueList {
    buf: String,
    len: usize,
}

impl ValueList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment verbatim (function calls, bare numbers, rendered literals).
    pub fn push_fragment(&mut self, fragment: &str) {
        if self.len > 0 {
            self.buf.push(',');
        }
        self.buf.push_str(fragment);
        self.len += 1;
    }

    /// Append `raw` as a quoted, escaped literal.
    pub fn push_text(&mut self, raw: &str) {
        let quoted = quote_literal(raw);
        self.push_fragment(&quoted);
    }

    /// Number of values pushed so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn finish(self) -> String {
        self.buf
    }
}
