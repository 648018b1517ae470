//! CSV recipient lists.
//!
//! The whole file is loaded on open. Excel exports are often Windows-1252
//! rather than UTF-8, so undecodable input falls back to that encoding. The
//! file is rewritten atomically on persist in the encoding it was read in,
//! keeping a UTF-8 BOM if the original had one.

use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use tracing::{debug, info, warn};

use crate::error::{MergeError, Result};
use crate::model::outcome::CellMark;
use crate::model::row::{Cell, FIRST_DATA_ROW};
use crate::store::{RowSource, RowStore};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A CSV file opened as a row store. Fill marks are not representable and
/// are dropped.
#[derive(Debug)]
pub struct CsvRowStore {
    path: PathBuf,
    delimiter: u8,
    bom: bool,
    encoding: &'static Encoding,
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl CsvRowStore {
    pub fn open(path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = std::fs::read(&path).map_err(|e| MergeError::open(&path, e))?;

        let bom = data.starts_with(UTF8_BOM);
        let (text, encoding) = decode(if bom { &data[UTF8_BOM.len()..] } else { &data });

        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record
                .map_err(|e| invalid(&path, e))?
                .iter()
                .map(String::from)
                .collect(),
            None => {
                return Err(MergeError::InvalidRowStore {
                    path,
                    reason: "missing header row".into(),
                })
            }
        };

        let mut rows = Vec::new();
        for record in records {
            let record = record.map_err(|e| invalid(&path, e))?;
            rows.push(
                record
                    .iter()
                    .map(|field| (!field.is_empty()).then(|| field.to_string()))
                    .collect(),
            );
        }

        debug!(
            path = %path.display(),
            columns = headers.len(),
            rows = rows.len(),
            encoding = encoding.name(),
            "Loaded recipient list"
        );

        Ok(Self {
            path,
            delimiter,
            bom,
            encoding,
            headers,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The encoding the file was read in, and will be written back in.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    fn render(&self) -> Result<String> {
        let mut writer = ::csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_writer(Vec::new());

        writer
            .write_record(&self.headers)
            .map_err(|e| invalid(&self.path, e))?;
        let width = self.headers.len();
        for row in &self.rows {
            let mut fields: Vec<&str> = row.iter().map(|c| c.as_deref().unwrap_or("")).collect();
            if fields.len() < width {
                fields.resize(width, "");
            }
            writer.write_record(&fields).map_err(|e| invalid(&self.path, e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| MergeError::io(&self.path, e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| MergeError::InvalidRowStore {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// File contents in the original encoding. A Windows-1252 list that
    /// gained characters outside that charset is switched to UTF-8 with a BOM.
    fn encode(&mut self, text: &str) -> Vec<u8> {
        if self.encoding == WINDOWS_1252 {
            let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
            if !unmappable {
                return bytes.into_owned();
            }
            warn!(
                path = %self.path.display(),
                "Recipient list no longer fits Windows-1252, saving as UTF-8"
            );
            self.encoding = UTF_8;
            self.bom = true;
        }

        let mut out = Vec::with_capacity(text.len() + UTF8_BOM.len());
        if self.bom {
            out.extend_from_slice(UTF8_BOM);
        }
        out.extend_from_slice(text.as_bytes());
        out
    }
}

impl RowStore for CsvRowStore {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn data_rows(&self) -> usize {
        self.rows.len()
    }

    fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows
            .get(index.checked_sub(FIRST_DATA_ROW)?)
            .map(Vec::as_slice)
    }

    fn append_column(&mut self, name: &str) -> usize {
        self.headers.push(name.to_string());
        self.headers.len() - 1
    }

    fn write_cell(&mut self, index: usize, column: usize, value: &str, _mark: CellMark) -> Result<()> {
        let row = index
            .checked_sub(FIRST_DATA_ROW)
            .and_then(|i| self.rows.get_mut(i))
            .ok_or(MergeError::RowOutOfRange(index))?;
        if row.len() <= column {
            row.resize(column + 1, None);
        }
        row[column] = Some(value.to_string());
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rows.csv".to_string());
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));
        let text = self.render()?;
        let bytes = self.encode(&text);
        std::fs::write(&tmp, bytes).map_err(|e| MergeError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| MergeError::io(&self.path, e))?;
        info!(path = %self.path.display(), "Saved recipient list");
        Ok(())
    }
}

/// Opens a CSV file per run.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            path: path.into(),
            delimiter,
        }
    }
}

impl RowSource for CsvSource {
    fn open(&self) -> Result<Box<dyn RowStore>> {
        Ok(Box::new(CsvRowStore::open(&self.path, self.delimiter)?))
    }
}

fn decode(data: &[u8]) -> (String, &'static Encoding) {
    match std::str::from_utf8(data) {
        Ok(text) => (text.to_string(), UTF_8),
        Err(_) => {
            debug!("Recipient list is not UTF-8, decoding as Windows-1252");
            let (text, _, _) = WINDOWS_1252.decode(data);
            (text.into_owned(), WINDOWS_1252)
        }
    }
}

fn invalid(path: &Path, err: ::csv::Error) -> MergeError {
    MergeError::InvalidRowStore {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_reads_headers_and_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.csv");
        std::fs::write(&path, "Name,Email,CC\nBob,bob@x.com,\n\"Smith, Ann\",ann@x.com\n").unwrap();

        let store = CsvRowStore::open(&path, b',').unwrap();
        assert_eq!(store.headers().to_vec(), vec!["Name", "Email", "CC"]);
        assert_eq!(store.data_rows(), 2);
        assert_eq!(
            store.row(2).unwrap(),
            &[Some("Bob".to_string()), Some("bob@x.com".to_string()), None]
        );
        assert_eq!(store.row(3).unwrap().len(), 2);
        assert_eq!(store.row(3).unwrap()[0].as_deref(), Some("Smith, Ann"));
    }

    #[test]
    fn test_empty_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            CsvRowStore::open(&path, b','),
            Err(MergeError::InvalidRowStore { .. })
        ));
    }

    #[test]
    fn test_persist_rewrites_with_appended_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.csv");
        std::fs::write(&path, b"\xEF\xBB\xBFEmail\na@x.com\nb@x.com\n").unwrap();

        let mut store = CsvRowStore::open(&path, b',').unwrap();
        let status = store.append_column("Status");
        store.write_cell(3, status, "Sent", CellMark::Sent).unwrap();
        store.persist().unwrap();

        let written = std::fs::read(&path).unwrap();
        assert!(written.starts_with(UTF8_BOM));
        assert_eq!(
            String::from_utf8_lossy(&written[3..]),
            "Email,Status\na@x.com,\nb@x.com,Sent\n"
        );
        assert!(!dir.path().join(".list.csv.tmp").exists());
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        std::fs::write(&path, b"Name,Email\nJos\xE9,jose@x.com\n").unwrap();
        let store = CsvRowStore::open(&path, b',').unwrap();
        assert_eq!(store.row(2).unwrap()[0].as_deref(), Some("José"));
        assert_eq!(store.encoding(), WINDOWS_1252);
    }

    #[test]
    fn test_windows_1252_is_written_back_as_1252() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        std::fs::write(&path, b"Name,Email\nJos\xE9,jose@x.com\n").unwrap();

        let mut store = CsvRowStore::open(&path, b',').unwrap();
        let status = store.append_column("Status");
        store.write_cell(2, status, "Sent", CellMark::Sent).unwrap();
        store.persist().unwrap();

        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"Name,Email,Status\nJos\xE9,jose@x.com,Sent\n".to_vec()
        );
        assert_eq!(
            CsvRowStore::open(&path, b',').unwrap().row(2).unwrap()[0].as_deref(),
            Some("José")
        );
    }

    #[test]
    fn test_windows_1252_switches_to_utf8_for_unmappable_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        std::fs::write(&path, b"Name,Email\nJos\xE9,jose@x.com\n").unwrap();

        let mut store = CsvRowStore::open(&path, b',').unwrap();
        let status = store.append_column("Status");
        store
            .write_cell(2, status, "Error: 550 \u{2717}", CellMark::Error)
            .unwrap();
        store.persist().unwrap();

        let written = std::fs::read(&path).unwrap();
        assert!(written.starts_with(UTF8_BOM));
        assert_eq!(
            std::str::from_utf8(&written[3..]).unwrap(),
            "Name,Email,Status\nJosé,jose@x.com,Error: 550 \u{2717}\n"
        );
        assert_eq!(store.encoding(), UTF_8);
    }

    #[test]
    fn test_utf8_without_bom_stays_without_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.csv");
        std::fs::write(&path, "Name\nJosé\n").unwrap();

        let mut store = CsvRowStore::open(&path, b',').unwrap();
        store.persist().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), "Name\nJosé\n".as_bytes().to_vec());
    }

    #[test]
    fn test_semicolon_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.csv");
        std::fs::write(&path, "Name;Email\nBob;bob@x.com\n").unwrap();
        let store = CsvRowStore::open(&path, b';').unwrap();
        assert_eq!(store.headers().len(), 2);
    }
}
