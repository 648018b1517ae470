//! In-memory row store, for embedding the dispatcher and for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{MergeError, Result};
use crate::model::outcome::CellMark;
use crate::model::row::{Cell, FIRST_DATA_ROW};
use crate::store::{RowSource, RowStore};

/// A header row, data rows and the fill marks written so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    /// `(row index, column) -> mark`.
    pub marks: HashMap<(usize, usize), CellMark>,
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            headers,
            rows,
            marks: HashMap::new(),
        }
    }

    /// Value of a cell by row index and header name.
    pub fn cell(&self, index: usize, header: &str) -> Option<&str> {
        let col = self.headers.iter().position(|h| h == header)?;
        self.rows
            .get(index.checked_sub(FIRST_DATA_ROW)?)?
            .get(col)?
            .as_deref()
    }
}

/// Working copy of a [`Sheet`].
///
/// When opened from a [`MemorySource`], `persist` publishes the copy back to
/// the source, the way a file store saves to disk.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    sheet: Sheet,
    target: Option<Arc<Mutex<Sheet>>>,
}

impl MemoryRowStore {
    pub fn new(sheet: Sheet) -> Self {
        Self {
            sheet,
            target: None,
        }
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }
}

impl RowStore for MemoryRowStore {
    fn headers(&self) -> &[String] {
        &self.sheet.headers
    }

    fn data_rows(&self) -> usize {
        self.sheet.rows.len()
    }

    fn row(&self, index: usize) -> Option<&[Cell]> {
        self.sheet
            .rows
            .get(index.checked_sub(FIRST_DATA_ROW)?)
            .map(Vec::as_slice)
    }

    fn append_column(&mut self, name: &str) -> usize {
        self.sheet.headers.push(name.to_string());
        self.sheet.headers.len() - 1
    }

    fn write_cell(&mut self, index: usize, column: usize, value: &str, mark: CellMark) -> Result<()> {
        let row = index
            .checked_sub(FIRST_DATA_ROW)
            .and_then(|i| self.sheet.rows.get_mut(i))
            .ok_or(MergeError::RowOutOfRange(index))?;
        if row.len() <= column {
            row.resize(column + 1, None);
        }
        row[column] = Some(value.to_string());
        self.sheet.marks.insert((index, column), mark);
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        if let Some(target) = &self.target {
            let mut published = target.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *published = self.sheet.clone();
        }
        Ok(())
    }
}

/// Shared sheet that hands out a fresh working copy per run.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sheet: Arc<Mutex<Sheet>>,
}

impl MemorySource {
    pub fn new(sheet: Sheet) -> Self {
        Self {
            sheet: Arc::new(Mutex::new(sheet)),
        }
    }

    /// The last persisted state.
    pub fn snapshot(&self) -> Sheet {
        self.sheet
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RowSource for MemorySource {
    fn open(&self) -> Result<Box<dyn RowStore>> {
        Ok(Box::new(MemoryRowStore {
            sheet: self.snapshot(),
            target: Some(Arc::clone(&self.sheet)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sheet {
        Sheet::new(
            vec!["Email".into()],
            vec![vec![Some("a@x".into())], vec![Some("b@x".into())]],
        )
    }

    #[test]
    fn test_write_pads_row() {
        let mut store = MemoryRowStore::new(sample());
        store.write_cell(3, 2, "Sent", CellMark::Sent).unwrap();
        assert_eq!(store.row(3).unwrap().len(), 3);
        assert_eq!(store.sheet().marks.get(&(3, 2)), Some(&CellMark::Sent));
        assert!(matches!(
            store.write_cell(9, 0, "x", CellMark::Sent),
            Err(MergeError::RowOutOfRange(9))
        ));
        assert!(store.row(1).is_none());
    }

    #[test]
    fn test_writes_publish_only_on_persist() {
        let source = MemorySource::new(sample());
        let mut store = source.open().unwrap();
        let col = store.append_column("Status");
        store.write_cell(2, col, "Sent", CellMark::Sent).unwrap();
        assert_eq!(source.snapshot().cell(2, "Status"), None);

        store.persist().unwrap();
        assert_eq!(source.snapshot().cell(2, "Status"), Some("Sent"));
    }
}
