//! Rows, cells and column lookup.
//!
//! Row indices follow spreadsheet numbering: row 1 is the header row and
//! row 2 is the first data row. Checkpoints and log lines use the same
//! numbering so an operator can find the row in the file.

/// A single cell. `None` means the cell is empty.
pub type Cell = Option<String>;

/// Index of the header row.
pub const HEADER_ROW: usize = 1;

/// Index of the first data row.
pub const FIRST_DATA_ROW: usize = 2;

/// Normalize a header name for case-insensitive matching.
pub fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Position of the first header whose normalized name equals `name`.
pub fn find_column(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| normalize_header(h) == name)
}

/// Position of the first alias (in alias order) present among the headers.
pub fn find_column_by_aliases(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|alias| find_column(headers, alias))
}

/// The trimmed contents of a cell, or `None` if it is empty or blank.
pub fn cell_text(cell: Option<&Cell>) -> Option<&str> {
    cell.and_then(|c| c.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Pad `values` with empty cells on the right until it is `len` long.
pub fn pad_row(values: &mut Vec<Cell>, len: usize) {
    if values.len() < len {
        values.resize(len, None);
    }
}

/// The header list used for placeholders: names that are not blank,
/// paired with their column position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleHeaders {
    pub names: Vec<String>,
    pub positions: Vec<usize>,
}

impl VisibleHeaders {
    pub fn from_headers(headers: &[String]) -> Self {
        let mut visible = Self::default();
        for (idx, header) in headers.iter().enumerate() {
            if !header.trim().is_empty() {
                visible.names.push(header.clone());
                visible.positions.push(idx);
            }
        }
        visible
    }

    /// Project a full row down to the visible columns.
    pub fn project(&self, values: &[Cell]) -> Vec<Cell> {
        self.positions
            .iter()
            .map(|&i| values.get(i).cloned().flatten())
            .collect()
    }
}
