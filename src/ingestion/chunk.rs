//! Byte-budgeted line cursor.
//!
//! [`ChunkReader`] turns any [`BufRead`] into a sequence of [`Chunk`]s. A chunk keeps taking
//! complete lines until the bytes consumed reach the budget; the line that crosses the budget
//! is included, lines are never split. Every chunk therefore holds at least one line, and the
//! number of lines per chunk depends on line lengths, not on a row count.

use std::io::{self, BufRead};

/// One input line with its file-wide row number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedLine {
    /// 1-based ordinal among the non-blank data lines of the file.
    pub row_number: usize,
    /// Line text without its terminator.
    pub text: String,
}

/// Lines read within one byte window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chunk {
    pub lines: Vec<NumberedLine>,
    /// Raw bytes consumed, terminators and skipped blank lines included.
    pub bytes: usize,
}

impl Chunk {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Row number range covered by this chunk.
    pub fn row_span(&self) -> Option<(usize, usize)> {
        Some((self.lines.first()?.row_number, self.lines.last()?.row_number))
    }
}

/// Cursor producing [`Chunk`]s of at most `max_bytes` (plus the tail of the crossing line).
#[derive(Debug)]
pub struct ChunkReader<R> {
    reader: R,
    max_bytes: usize,
    rows_seen: usize,
    bytes_read: u64,
}

impl<R: BufRead> ChunkReader<R> {
    /// # Panics
    ///
    /// Panics if `max_bytes == 0`.
    pub fn new(reader: R, max_bytes: usize) -> Self {
        assert!(max_bytes > 0, "max_bytes must be > 0");
        Self {
            reader,
            max_bytes,
            rows_seen: 0,
            bytes_read: 0,
        }
    }

    /// Read one raw line (header use). Returns `None` at EOF. Does not advance row numbering.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.bytes_read += n as u64;
        trim_terminator(&mut buf);
        Ok(Some(buf))
    }

    /// Next window of lines. An empty chunk means EOF.
    pub fn next_chunk(&mut self) -> io::Result<Chunk> {
        let mut chunk = Chunk::default();
        // A window holding only blank lines keeps reading; only EOF may end a chunk empty.
        while chunk.bytes < self.max_bytes || chunk.lines.is_empty() {
            let mut buf = String::new();
            let n = self.reader.read_line(&mut buf)?;
            if n == 0 {
                break;
            }
            chunk.bytes += n;
            self.bytes_read += n as u64;
            trim_terminator(&mut buf);
            if buf.trim().is_empty() {
                continue;
            }
            self.rows_seen += 1;
            chunk.lines.push(NumberedLine {
                row_number: self.rows_seen,
                text: buf,
            });
        }
        Ok(chunk)
    }

    /// Data rows handed out so far.
    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    /// Total bytes consumed from the underlying reader.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: BufRead> Iterator for ChunkReader<R> {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Ok(chunk) if chunk.is_empty() => None,
            other => Some(other),
        }
    }
}

fn trim_terminator(buf: &mut String) {
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ChunkReader;
    use std::io::Cursor;

    fn texts(chunk: &super::Chunk) -> Vec<&str> {
        chunk.lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn line_crossing_the_budget_is_included() {
        // 4 bytes per line.
        let input = "aaa\nbbb\nccc\nddd\n";
        let mut rdr = ChunkReader::new(Cursor::new(input), 6);
        let c1 = rdr.next_chunk().unwrap();
        assert_eq!(texts(&c1), vec!["aaa", "bbb"]);
        assert_eq!(c1.bytes, 8);
        let c2 = rdr.next_chunk().unwrap();
        assert_eq!(texts(&c2), vec!["ccc", "ddd"]);
        assert!(rdr.next_chunk().unwrap().is_empty());
    }

    #[test]
    fn tiny_budget_still_yields_one_line_per_chunk() {
        let mut rdr = ChunkReader::new(Cursor::new("long line here\nx"), 1);
        let chunks: Vec<_> = rdr.by_ref().map(|c| c.unwrap()).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(texts(&chunks[1]), vec!["x"]);
        assert_eq!(rdr.bytes_read(), 16);
    }

    #[test]
    fn row_numbers_continue_across_chunks_and_skip_blanks() {
        let input = "h\r\na\r\n\r\nb\r\nc\r\n";
        let mut rdr = ChunkReader::new(Cursor::new(input), 3);
        assert_eq!(rdr.read_line().unwrap().as_deref(), Some("h"));
        let numbers: Vec<(usize, String)> = rdr
            .by_ref()
            .flat_map(|c| c.unwrap().lines)
            .map(|l| (l.row_number, l.text))
            .collect();
        assert_eq!(
            numbers,
            vec![(1, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())]
        );
        assert_eq!(rdr.rows_seen(), 3);
    }

    #[test]
    fn blank_only_window_is_not_eof() {
        let mut rdr = ChunkReader::new(Cursor::new("\n\n\nlast\n"), 1);
        let chunk = rdr.next_chunk().unwrap();
        assert_eq!(texts(&chunk), vec!["last"]);
        assert_eq!(chunk.lines[0].row_number, 1);
    }

    #[test]
    #[should_panic(expected = "max_bytes must be > 0")]
    fn zero_budget_is_rejected() {
        let _ = ChunkReader::new(Cursor::new(""), 0);
    }
}
