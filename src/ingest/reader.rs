//! Forward-only line reader over large newline-delimited files.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Read buffer size; dumps are large and read sequentially.
const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Longest line kept in memory, excluding its terminator.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// One line handed out by [`LineReader::next_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// The line without its terminator.
    Text(String),
    /// Longer than the reader's limit. The line was read past and dropped;
    /// `bytes` is its length without the terminator.
    TooLong { bytes: u64 },
}

/// Streams a file one line at a time without loading it into memory.
///
/// `position` counts every line handed out or skipped, so it always equals
/// the file line number of the most recent line. A line longer than the
/// limit is consumed in chunks and never buffered whole.
#[derive(Debug)]
pub struct LineReader {
    inner: BufReader<File>,
    buf: Vec<u8>,
    max_line_bytes: usize,
    line_bytes: u64,
    too_long: bool,
    position: u64,
}

impl LineReader {
    /// Opens `path` for reading with the default [`MAX_LINE_BYTES`] limit.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the file cannot be opened.
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            inner: BufReader::with_capacity(READ_BUFFER_BYTES, file),
            buf: Vec::new(),
            max_line_bytes: MAX_LINE_BYTES,
            line_bytes: 0,
            too_long: false,
            position: 0,
        })
    }

    /// Replaces the line length limit.
    #[must_use]
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Number of lines consumed so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the next line, or `None` at end of file.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the JSON parser
    /// downstream decides whether the line is usable.
    ///
    /// # Errors
    ///
    /// Returns the IO error if reading fails.
    pub async fn next_line(&mut self) -> io::Result<Option<Line>> {
        if !self.advance().await? {
            return Ok(None);
        }
        if self.too_long {
            return Ok(Some(Line::TooLong {
                bytes: self.line_bytes,
            }));
        }
        Ok(Some(Line::Text(
            String::from_utf8_lossy(&self.buf).into_owned(),
        )))
    }

    /// Advances past up to `count` lines without decoding them.
    ///
    /// Returns how many lines were actually skipped, which is less than
    /// `count` only when the file ends first.
    ///
    /// # Errors
    ///
    /// Returns the IO error if reading fails.
    pub async fn skip(&mut self, count: u64) -> io::Result<u64> {
        let mut skipped = 0;
        while skipped < count {
            if !self.advance().await? {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    async fn advance(&mut self) -> io::Result<bool> {
        self.buf.clear();
        self.line_bytes = 0;
        self.too_long = false;
        let mut read_any = false;

        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            read_any = true;
            let (end, found) = match available.iter().position(|&b| b == b'\n') {
                Some(newline) => (newline + 1, true),
                None => (available.len(), false),
            };
            let content = if found { end - 1 } else { end };

            if !self.too_long {
                if self.buf.len() + content > self.max_line_bytes {
                    self.too_long = true;
                    self.buf = Vec::new();
                } else {
                    self.buf.extend_from_slice(&available[..content]);
                }
            }
            self.line_bytes += content as u64;
            self.inner.consume(end);
            if found {
                break;
            }
        }

        if !read_any {
            return Ok(false);
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        self.position += 1;
        Ok(true)
    }
}

/// Counts the lines in `path`; used as the progress total when none is given.
///
/// # Errors
///
/// Returns the IO error if the file cannot be opened or read.
pub async fn count_lines(path: &Path) -> io::Result<u64> {
    let mut reader = LineReader::open(path).await?;
    reader.skip(u64::MAX).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use tempfile::TempDir;

    fn text(line: Line) -> String {
        match line {
            Line::Text(text) => text,
            Line::TooLong { bytes } => panic!("unexpected oversized line of {bytes} bytes"),
        }
    }

    fn write_file(dir: &TempDir, body: &[u8]) -> PathBuf {
        let path = dir.path().join("input.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_lines_and_tracks_position() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, b"{\"a\":1}\r\n{\"a\":2}\n{\"a\":3}");

        let mut reader = LineReader::open(&path).await.unwrap();
        assert_eq!(reader.next_line().await.unwrap().map(text).as_deref(), Some("{\"a\":1}"));
        assert_eq!(reader.next_line().await.unwrap().map(text).as_deref(), Some("{\"a\":2}"));
        assert_eq!(reader.next_line().await.unwrap().map(text).as_deref(), Some("{\"a\":3}"));
        assert_eq!(reader.position(), 3);
        assert!(reader.next_line().await.unwrap().is_none());
        assert_eq!(reader.position(), 3);
    }

    #[tokio::test]
    async fn test_blank_lines_count_toward_position() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, b"a\n\nb\n");

        let mut reader = LineReader::open(&path).await.unwrap();
        assert_eq!(reader.next_line().await.unwrap().map(text).as_deref(), Some("a"));
        assert_eq!(reader.next_line().await.unwrap().map(text).as_deref(), Some(""));
        assert_eq!(reader.next_line().await.unwrap().map(text).as_deref(), Some("b"));
        assert!(reader.next_line().await.unwrap().is_none());
        assert_eq!(reader.position(), 3);
    }

    #[tokio::test]
    async fn test_skip_then_resume() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, b"1\n2\n3\n4\n");

        let mut reader = LineReader::open(&path).await.unwrap();
        assert_eq!(reader.skip(2).await.unwrap(), 2);
        assert_eq!(reader.next_line().await.unwrap().map(text).as_deref(), Some("3"));
        assert_eq!(reader.position(), 3);
    }

    #[tokio::test]
    async fn test_skip_past_end_reports_short_count() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, b"1\n2\n");

        let mut reader = LineReader::open(&path).await.unwrap();
        assert_eq!(reader.skip(10).await.unwrap(), 2);
        assert!(reader.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced_not_fatal() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, b"ok\n\xff\xfe\nafter\n");

        let mut reader = LineReader::open(&path).await.unwrap();
        reader.next_line().await.unwrap();
        let garbled = text(reader.next_line().await.unwrap().unwrap());
        assert!(garbled.contains('\u{FFFD}'));
        assert_eq!(reader.next_line().await.unwrap().map(text).as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn test_count_lines() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, b"a\nb\nc");

        assert_eq!(count_lines(&path).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_open_missing_file_errors() {
        let temp = TempDir::new().unwrap();
        let result = LineReader::open(&temp.path().join("missing.json")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_oversized_line_is_dropped_and_reading_continues() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, b"short\n0123456789abcdef\nnext\n");

        let mut reader = LineReader::open(&path).await.unwrap().with_max_line_bytes(8);
        assert_eq!(
            reader.next_line().await.unwrap(),
            Some(Line::Text("short".to_string()))
        );
        assert_eq!(
            reader.next_line().await.unwrap(),
            Some(Line::TooLong { bytes: 16 })
        );
        assert_eq!(
            reader.next_line().await.unwrap(),
            Some(Line::Text("next".to_string()))
        );
        assert_eq!(reader.position(), 3);
    }

    #[tokio::test]
    async fn test_oversized_final_line_without_terminator() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, b"a\nxxxxxxxxxxxx");

        let mut reader = LineReader::open(&path).await.unwrap().with_max_line_bytes(4);
        reader.next_line().await.unwrap();
        assert_eq!(
            reader.next_line().await.unwrap(),
            Some(Line::TooLong { bytes: 12 })
        );
        assert!(reader.next_line().await.unwrap().is_none());
        assert_eq!(reader.position(), 2);
    }

    #[tokio::test]
    async fn test_line_at_limit_is_kept() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, b"abcd\r\n");

        let mut reader = LineReader::open(&path).await.unwrap().with_max_line_bytes(5);
        assert_eq!(
            reader.next_line().await.unwrap(),
            Some(Line::Text("abcd".to_string()))
        );
    }
}
