//! Attachment policy: whether a row receives the draft's attachments.
//!
//! In conditional mode a flag column decides per row. If the column cannot
//! be found, nobody gets attachments: a missing column must never turn into
//! a list-wide send.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RowError, RowErrorKind};
use crate::model::row::{find_column, find_column_by_aliases, Cell};

/// Header names (normalized) recognized as the attachment flag column.
pub const ATTACHMENT_ALIASES: [&str; 5] = [
    "attachment",
    "attachments",
    "send attachment",
    "send attachments",
    "include attachments",
];

/// Cell values that withhold attachments.
const DECLINE_VALUES: [&str; 4] = ["no", "n", "false", "0"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AttachmentMode {
    /// Every row gets every attachment.
    #[default]
    SendAll,
    /// The flag column decides per row.
    Conditional,
}

/// What an empty flag cell means in conditional mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmptyCellDefault {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentPolicy {
    pub mode: AttachmentMode,
    pub empty_cell_default: EmptyCellDefault,
}

/// Where the flag lives, determined once per header list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagColumn {
    /// Send-all mode never reads a column.
    NotNeeded,
    Missing,
    Found(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    SendAll,
    ColumnMissing,
    EmptyCell(EmptyCellDefault),
    Declined(String),
    Accepted(String),
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendAll => f.write_str("send-all mode"),
            Self::ColumnMissing => f.write_str("attachment column not found"),
            Self::EmptyCell(EmptyCellDefault::Include) => f.write_str("empty cell, default include"),
            Self::EmptyCell(EmptyCellDefault::Exclude) => f.write_str("empty cell, default exclude"),
            Self::Declined(v) => write!(f, "cell says '{v}'"),
            Self::Accepted(v) => write!(f, "cell says '{v}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDecision {
    pub include: bool,
    pub reason: DecisionReason,
}

impl AttachmentDecision {
    fn include(reason: DecisionReason) -> Self {
        Self {
            include: true,
            reason,
        }
    }

    fn exclude(reason: DecisionReason) -> Self {
        Self {
            include: false,
            reason,
        }
    }
}

impl AttachmentPolicy {
    pub fn locate(&self, headers: &[String]) -> FlagColumn {
        match self.mode {
            AttachmentMode::SendAll => FlagColumn::NotNeeded,
            AttachmentMode::Conditional => find_column_by_aliases(headers, &ATTACHMENT_ALIASES)
                .map(FlagColumn::Found)
                .unwrap_or(FlagColumn::Missing),
        }
    }

    /// Decide for one row. `row` must already be padded to the header list.
    pub fn evaluate(
        &self,
        column: FlagColumn,
        row: &[Cell],
    ) -> Result<AttachmentDecision, RowError> {
        let idx = match column {
            FlagColumn::NotNeeded => return Ok(AttachmentDecision::include(DecisionReason::SendAll)),
            FlagColumn::Missing => {
                return Ok(AttachmentDecision::exclude(DecisionReason::ColumnMissing))
            }
            FlagColumn::Found(idx) => idx,
        };
        let cell = row.get(idx).ok_or_else(|| {
            RowError::new(
                RowErrorKind::AttachmentPolicy,
                format!("attachment column {} is beyond the row's {} cells", idx + 1, row.len()),
            )
        })?;
        let value = cell.as_deref().unwrap_or_default().trim().to_lowercase();

        Ok(if value.is_empty() {
            let reason = DecisionReason::EmptyCell(self.empty_cell_default);
            match self.empty_cell_default {
                EmptyCellDefault::Include => AttachmentDecision::include(reason),
                EmptyCellDefault::Exclude => AttachmentDecision::exclude(reason),
            }
        } else if DECLINE_VALUES.contains(&value.as_str()) {
            AttachmentDecision::exclude(DecisionReason::Declined(value))
        } else {
            AttachmentDecision::include(DecisionReason::Accepted(value))
        })
    }
}

/// Locate and evaluate in one call.
pub fn evaluate(
    policy: &AttachmentPolicy,
    row: &[Cell],
    headers: &[String],
) -> Result<AttachmentDecision, RowError> {
    policy.evaluate(policy.locate(headers), row)
}

/// A recipient whose flag cell is blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmptyFlag {
    pub row: usize,
    pub name: String,
    pub email: String,
}

/// Find recipients with an empty attachment flag, stopping after `limit`.
///
/// Returns `None` if the list has no flag column at all. Rows without an
/// email address are not recipients and are ignored.
pub fn scan_empty_flags<'a>(
    headers: &[String],
    rows: impl IntoIterator<Item = (usize, &'a [Cell])>,
    limit: usize,
) -> Option<Vec<EmptyFlag>> {
    let flag = find_column_by_aliases(headers, &ATTACHMENT_ALIASES)?;
    let email = find_column(headers, "email");
    let name = find_column(headers, "name");
    let text = |row: &[Cell], col: Option<usize>| {
        col.and_then(|c| crate::model::row::cell_text(row.get(c)))
            .map(String::from)
    };

    let mut found = Vec::new();
    for (idx, row) in rows {
        if found.len() >= limit {
            break;
        }
        if text(row, Some(flag)).is_some() {
            continue;
        }
        if let Some(address) = text(row, email) {
            found.push(EmptyFlag {
                row: idx,
                name: text(row, name).unwrap_or_else(|| "(No Name)".to_string()),
                email: address,
            });
        }
    }
    Some(found)
}
