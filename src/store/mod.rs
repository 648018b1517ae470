//! Recipient lists and checkpoints.
//!
//! A [`RowStore`] is a table with a header row. The dispatcher reads rows
//! from it and writes outcomes back into its control columns. Writes stay in
//! memory until [`RowStore::persist`] is called.

pub mod checkpoint;
pub mod csv;
pub mod memory;

use crate::error::Result;
use crate::model::outcome::{CellMark, ControlColumn};
use crate::model::row::{find_column_by_aliases, Cell, FIRST_DATA_ROW};

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use self::csv::{CsvRowStore, CsvSource};
pub use memory::{MemoryRowStore, MemorySource, Sheet};

/// A tabular recipient list, addressed with spreadsheet row numbers.
pub trait RowStore: Send {
    /// Header names from row 1, including appended columns.
    fn headers(&self) -> &[String];

    /// Number of data rows (rows after the header).
    fn data_rows(&self) -> usize;

    /// Values of row `index` (2 = first data row), possibly shorter than
    /// the header list.
    fn row(&self, index: usize) -> Option<&[Cell]>;

    /// Append a header and return its column position.
    fn append_column(&mut self, name: &str) -> usize;

    /// Set one cell. `mark` is an advisory fill color.
    fn write_cell(&mut self, index: usize, column: usize, value: &str, mark: CellMark)
        -> Result<()>;

    /// Flush all writes to durable storage.
    fn persist(&mut self) -> Result<()>;

    /// Index of the last data row, or 1 if there are none.
    fn last_row(&self) -> usize {
        self.data_rows() + FIRST_DATA_ROW - 1
    }
}

/// Opens a row store for the duration of one run.
pub trait RowSource: Send {
    fn open(&self) -> Result<Box<dyn RowStore>>;
}

/// Column positions of Status, Stop and Resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlColumns {
    pub status: usize,
    pub stop: usize,
    pub resume: usize,
}

impl ControlColumns {
    pub fn position(&self, column: ControlColumn) -> usize {
        match column {
            ControlColumn::Status => self.status,
            ControlColumn::Stop => self.stop,
            ControlColumn::Resume => self.resume,
        }
    }
}

/// Find the control columns, appending any that are missing.
pub fn ensure_control_columns(store: &mut dyn RowStore) -> ControlColumns {
    let mut locate = |column: ControlColumn| {
        find_column_by_aliases(store.headers(), column.aliases())
            .unwrap_or_else(|| store.append_column(column.name()))
    };
    ControlColumns {
        status: locate(ControlColumn::Status),
        stop: locate(ControlColumn::Stop),
        resume: locate(ControlColumn::Resume),
    }
}

/// Count data rows whose `Email` cell is not blank.
///
/// Falls back to the number of data rows if there is no `Email` column.
pub fn count_recipients(store: &dyn RowStore) -> usize {
    let Some(email) = crate::model::row::find_column(store.headers(), "email") else {
        return store.data_rows();
    };
    (FIRST_DATA_ROW..=store.last_row())
        .filter_map(|idx| store.row(idx))
        .filter(|row| crate::model::row::cell_text(row.get(email)).is_some())
        .count()
}
