//! Two-pass reader over the tab-separated catalog
//!
//! Pass one ([`count_rows`]) is a raw newline count used as the progress denominator.
//! Pass two ([`RecordStream`]) walks the same physical lines with the first one as the
//! header. Quoting is disabled, so a field is any run of bytes up to the next tab or
//! line end. Lines whose field count differs from the header (blank lines have zero
//! fields) are reported as [`Row::Skipped`] and never become records.

use icecat_common::{IngestError, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const READ_BUFFER: usize = 1024 * 1024;
const DELIMITER: u8 = b'\t';

/// Number of data lines: physical lines minus the header.
///
/// A last line without a trailing newline still counts. Zero data lines is an
/// [`IngestError::EmptyFile`].
pub fn count_rows(path: &Path) -> Result<u64> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);

    let mut newlines = 0u64;
    let mut last_byte = None;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        newlines += buf.iter().filter(|&&b| b == b'\n').count() as u64;
        last_byte = buf.last().copied();
        let len = buf.len();
        reader.consume(len);
    }

    let lines = match last_byte {
        None => 0,
        Some(b'\n') => newlines,
        Some(_) => newlines + 1,
    };
    let rows = lines.saturating_sub(1);
    if rows == 0 {
        return Err(IngestError::EmptyFile(path.to_path_buf()));
    }

    debug!(path = %path.display(), rows, "Counted data rows");
    Ok(rows)
}

/// Column names from line 1. Its length is the arity every data line must match.
#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    /// `(name index, value index)` per distinct name: the key sits where the name first
    /// appears, the value comes from its last column
    effective: Vec<(usize, usize)>,
}

impl Header {
    pub fn new(names: Vec<String>) -> Self {
        let effective = (0..names.len())
            .filter(|&i| !names[..i].contains(&names[i]))
            .map(|i| {
                let last = names.iter().rposition(|n| *n == names[i]).unwrap_or(i);
                (i, last)
            })
            .collect();
        Self { names, effective }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn arity(&self) -> usize {
        self.names.len()
    }

    /// Index of `name`; with duplicate names the last column wins
    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().rposition(|n| n == name)
    }
}

/// One data line whose arity matched the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    line: u64,
    header: Arc<Header>,
    values: Vec<String>,
}

impl Record {
    /// `values` must have exactly `header.arity()` entries
    pub fn new(line: u64, header: Arc<Header>, values: Vec<String>) -> Self {
        debug_assert_eq!(header.arity(), values.len());
        Self {
            line,
            header,
            values,
        }
    }

    /// Physical 1-based line number in the file (the header is line 1)
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .index_of(column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Column/value pairs in header order, duplicates resolved
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .effective
            .iter()
            .map(|&(name, value)| (self.header.names[name].as_str(), self.values[value].as_str()))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.header.effective.len()))?;
        for (name, value) in self.fields() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Outcome of one physical data line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Record(Record),
    Skipped { line: u64, expected: usize, found: usize },
}

/// Lazy, single-use stream of rows. Re-reading requires opening a new stream.
pub struct RecordStream {
    path: PathBuf,
    reader: BufReader<File>,
    header: Arc<Header>,
    buffer: Vec<u8>,
    line: u64,
    finished: bool,
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("line", &self.line)
            .field("finished", &self.finished)
            .finish()
    }
}

impl RecordStream {
    /// Open `path` and consume its header line.
    ///
    /// A blank first line is an empty header; only a file with no lines at all has no
    /// header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut stream = Self {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(READ_BUFFER, file),
            header: Arc::new(Header::new(Vec::new())),
            buffer: Vec::new(),
            line: 0,
            finished: false,
        };

        if !stream.read_line()? {
            return Err(IngestError::MissingHeader(path.to_path_buf()));
        }
        let header = Header::new(split_fields(&stream.buffer).map(decode).collect());
        debug!(path = %path.display(), columns = ?header.names(), "Read header");
        stream.header = Arc::new(header);

        Ok(stream)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Load the next physical line into `buffer` without its terminator
    fn read_line(&mut self) -> Result<bool> {
        self.buffer.clear();
        if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
            return Ok(false);
        }
        if self.buffer.last() == Some(&b'\n') {
            self.buffer.pop();
            if self.buffer.last() == Some(&b'\r') {
                self.buffer.pop();
            }
        }
        self.line += 1;
        Ok(true)
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if !self.read_line()? {
            return Ok(None);
        }

        let line = self.line;
        let found = split_fields(&self.buffer).count();
        let expected = self.header.arity();
        if found != expected {
            return Ok(Some(Row::Skipped {
                line,
                expected,
                found,
            }));
        }

        let values = split_fields(&self.buffer).map(decode).collect();
        Ok(Some(Row::Record(Record::new(
            line,
            Arc::clone(&self.header),
            values,
        ))))
    }
}

impl Iterator for RecordStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.finished = true;
                None
            },
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            },
        }
    }
}

/// Tab-separated fields of one line; an empty line has none
fn split_fields(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    let fields = if line.is_empty() { None } else { Some(line.split(|&b| b == DELIMITER)) };
    fields.into_iter().flatten()
}

fn decode(field: &[u8]) -> String {
    String::from_utf8_lossy(field).into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn rows(path: &Path) -> Vec<Row> {
        RecordStream::open(path)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_count_rows_excludes_header() {
        let dir = TempDir::new().unwrap();
        let with_newline = write(&dir, "a.csv", b"h\n1\n2\n3\n");
        let without_newline = write(&dir, "b.csv", b"h\n1\n2\n3");
        assert_eq!(count_rows(&with_newline).unwrap(), 3);
        assert_eq!(count_rows(&without_newline).unwrap(), 3);
    }

    #[test]
    fn test_count_rows_header_only_is_empty() {
        let dir = TempDir::new().unwrap();
        let header_only = write(&dir, "h.csv", b"product_id\tname\n");
        let empty = write(&dir, "e.csv", b"");
        assert!(matches!(count_rows(&header_only), Err(IngestError::EmptyFile(_))));
        assert!(matches!(count_rows(&empty), Err(IngestError::EmptyFile(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = count_rows(Path::new("/nonexistent/icecat.csv")).unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_empty_file_has_no_header() {
        let dir = TempDir::new().unwrap();
        let empty = write(&dir, "e.csv", b"");
        assert!(matches!(
            RecordStream::open(&empty),
            Err(IngestError::MissingHeader(_))
        ));
    }

    #[test]
    fn test_arity_mismatch_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "data.csv",
            b"product_id\tname\n1\tWidget\n2\tGadget\textra\n\tNoId\n",
        );

        let rows = rows(&path);
        assert_eq!(rows.len(), 3);

        match &rows[0] {
            Row::Record(r) => {
                assert_eq!(r.line(), 2);
                assert_eq!(r.get("product_id"), Some("1"));
                assert_eq!(r.get("name"), Some("Widget"));
            },
            other => panic!("expected record, got {other:?}"),
        }
        assert_eq!(
            rows[1],
            Row::Skipped {
                line: 3,
                expected: 2,
                found: 3
            }
        );
        match &rows[2] {
            Row::Record(r) => {
                assert_eq!(r.line(), 4);
                assert_eq!(r.get("product_id"), Some(""));
            },
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_quotes_are_literal() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "q.csv",
            b"product_id\ttitle\n5\t19\" monitor \"Pro\"\n",
        );

        let rows = rows(&path);
        let Row::Record(record) = &rows[0] else {
            panic!("expected record");
        };
        assert_eq!(record.get("title"), Some("19\" monitor \"Pro\""));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u.csv", b"product_id\tname\n9\tCaf\xe9\n");

        let rows = rows(&path);
        let Row::Record(record) = &rows[0] else {
            panic!("expected record");
        };
        assert_eq!(record.get("name"), Some("Caf\u{FFFD}"));
    }

    #[test]
    fn test_duplicate_column_keeps_first_position_last_value() {
        let header = Arc::new(Header::new(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
        ]));
        let record = Record::new(
            2,
            header,
            vec!["first".to_string(), "x".to_string(), "second".to_string()],
        );

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"b":"second","a":"x"}"#);
        assert_eq!(record.get("b"), Some("second"));
    }

    #[test]
    fn test_blank_line_is_a_skipped_row() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "b.csv", b"product_id\tname\n1\tWidget\n\n3\tThing\n");

        assert_eq!(count_rows(&path).unwrap(), 3);
        let rows = rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[1],
            Row::Skipped {
                line: 3,
                expected: 2,
                found: 0
            }
        );
        let Row::Record(record) = &rows[2] else {
            panic!("expected record");
        };
        assert_eq!(record.line(), 4);
        assert_eq!(record.get("name"), Some("Thing"));
    }

    #[test]
    fn test_blank_first_line_is_empty_header() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "h.csv", b"\nproduct_id\tname\n1\tWidget\n");

        let stream = RecordStream::open(&path).unwrap();
        assert_eq!(stream.header().arity(), 0);
        let rows: Vec<Row> = stream.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| matches!(r, Row::Skipped { expected: 0, .. })));
    }

    #[test]
    fn test_crlf_terminators_are_stripped() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "w.csv", b"product_id\tname\r\n7\tLamp\r\n");

        let rows = rows(&path);
        let Row::Record(record) = &rows[0] else {
            panic!("expected record");
        };
        assert_eq!(record.get("name"), Some("Lamp"));
        assert_eq!(record.get("product_id"), Some("7"));
    }

    #[test]
    fn test_stream_is_not_restartable() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "s.csv", b"id\n1\n");
        let mut stream = RecordStream::open(&path).unwrap();
        assert!(stream.next().is_some());
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }
}
