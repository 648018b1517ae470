//! Progress and pending-count arithmetic.

/// What progress is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressBasis {
    /// Recipients in the whole list. Progress is absolute: row `idx` is at
    /// `(idx - 1) / total`.
    Known(usize),
    /// Rows from the start row to the end of the list.
    Unknown { remaining: usize },
}

impl ProgressBasis {
    pub fn new(total_rows: Option<usize>, start_row: usize, last_row: usize) -> Self {
        match total_rows {
            Some(total) if total > 0 => Self::Known(total),
            _ => Self::Unknown {
                remaining: (last_row + 1).saturating_sub(start_row).max(1),
            },
        }
    }

    pub fn total(&self) -> Option<usize> {
        match self {
            Self::Known(total) => Some(*total),
            Self::Unknown { .. } => None,
        }
    }

    /// Percent complete at row `idx`, after `processed` rows of this run.
    pub fn percent(&self, idx: usize, processed: usize) -> u8 {
        let (done, of) = match *self {
            Self::Known(total) => (idx.saturating_sub(1), total),
            Self::Unknown { remaining } => (processed, remaining),
        };
        ((done * 100 / of.max(1)).min(100)) as u8
    }

    /// Recipients estimated to be still unsent when stopping at row `idx`.
    pub fn pending(&self, idx: usize) -> usize {
        match *self {
            Self::Known(total) => total.saturating_sub(idx.saturating_sub(2)),
            Self::Unknown { .. } => 0,
        }
    }
}
