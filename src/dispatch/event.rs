//! Observer events emitted while a run is in progress.

use std::sync::mpsc::Sender;

use crate::model::row::Cell;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// Severity of a [`MergeEvent::Log`] line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Live status of the row being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Sending,
    Sent,
    Resumed,
    Error,
}

impl RowStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Sending => "Sending...",
            Self::Sent => "Sent",
            Self::Resumed => "Resumed",
            Self::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeEvent {
    State(RunState),
    Log {
        level: LogLevel,
        message: String,
    },
    /// Percent complete, 0 to 100.
    Progress(u8),
    Row {
        index: usize,
        values: Vec<Cell>,
        status: RowStatus,
    },
    Stopped {
        sent: usize,
        failed: usize,
        pending: usize,
    },
    Finished {
        sent: usize,
        failed: usize,
    },
    Fatal(String),
}

/// Fire-and-forget event channel. A dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<MergeEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<MergeEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: MergeEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(MergeEvent::Log {
            level,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (tx, rx) = std::sync::mpsc::channel();
        let sink = EventSink::new(tx);
        sink.emit(MergeEvent::Progress(10));
        assert_eq!(rx.recv().unwrap(), MergeEvent::Progress(10));
        drop(rx);
        sink.log(LogLevel::Info, "nobody listening");
    }

    #[test]
    fn test_row_status_labels() {
        assert_eq!(RowStatus::Sending.label(), "Sending...");
        assert_eq!(RowStatus::Resumed.label(), "Resumed");
    }
}
