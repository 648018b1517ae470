//! Row outcomes and the control columns they are written into.

use std::fmt;

/// The three columns the dispatcher owns in every recipient list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlColumn {
    Status,
    Stop,
    Resume,
}

impl ControlColumn {
    pub const ALL: [ControlColumn; 3] = [Self::Status, Self::Stop, Self::Resume];

    /// Name used when the column has to be appended.
    pub fn name(self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Stop => "Stop",
            Self::Resume => "Resume",
        }
    }

    /// Existing header names (normalized) that count as this column.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Status => &["status", "start"],
            Self::Stop => &["stop", "stopped"],
            Self::Resume => &["resume", "resumed"],
        }
    }
}

/// Advisory background color for an annotated cell.
///
/// Stores that cannot represent formatting (CSV) ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMark {
    /// Dark green: sent, attachments included or none in the draft.
    Sent,
    /// Light green: sent with attachments withheld.
    SentWithoutAttachment,
    Error,
    Stopped,
    Resumed,
}

impl CellMark {
    /// ARGB/RGB fill color as a hex string.
    pub fn fill(self) -> &'static str {
        match self {
            Self::Sent => "198754",
            Self::SentWithoutAttachment => "C6EFCE",
            Self::Error | Self::Stopped => "FFFF9999",
            Self::Resumed => "FFFFFF99",
        }
    }
}

/// The result recorded for a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Sent,
    SentWithAttachment,
    SentWithoutAttachment,
    Error(String),
    Stopped,
    Resumed,
}

impl RowOutcome {
    /// Success label for a sent row.
    pub fn sent(template_has_attachments: bool, included: bool) -> Self {
        match (template_has_attachments, included) {
            (false, _) => Self::Sent,
            (true, true) => Self::SentWithAttachment,
            (true, false) => Self::SentWithoutAttachment,
        }
    }

    /// Column this outcome is written into.
    pub fn column(&self) -> ControlColumn {
        match self {
            Self::Stopped => ControlColumn::Stop,
            Self::Resumed => ControlColumn::Resume,
            _ => ControlColumn::Status,
        }
    }

    pub fn mark(&self) -> CellMark {
        match self {
            Self::Sent | Self::SentWithAttachment => CellMark::Sent,
            Self::SentWithoutAttachment => CellMark::SentWithoutAttachment,
            Self::Error(_) => CellMark::Error,
            Self::Stopped => CellMark::Stopped,
            Self::Resumed => CellMark::Resumed,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(
            self,
            Self::Sent | Self::SentWithAttachment | Self::SentWithoutAttachment
        )
    }

    /// Recognize a value previously written into a control cell.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Sent" => Some(Self::Sent),
            "Sent with Attachment" => Some(Self::SentWithAttachment),
            "Sent without Attachment" => Some(Self::SentWithoutAttachment),
            "Stopped" => Some(Self::Stopped),
            "Resumed" => Some(Self::Resumed),
            other => other
                .strip_prefix("Error: ")
                .map(|msg| Self::Error(msg.to_string())),
        }
    }
}

impl fmt::Display for RowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => f.write_str("Sent"),
            Self::SentWithAttachment => f.write_str("Sent with Attachment"),
            Self::SentWithoutAttachment => f.write_str("Sent without Attachment"),
            Self::Error(msg) => write!(f, "Error: {msg}"),
            Self::Stopped => f.write_str("Stopped"),
            Self::Resumed => f.write_str("Resumed"),
        }
    }
}
