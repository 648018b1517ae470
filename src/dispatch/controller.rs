//! The row loop.
//!
//! ```text
//! Idle ──► Running ──► Completed   list exhausted, checkpoint deleted
//!              │
//!              ├─────► Stopped     cancel seen at a row boundary, checkpoint written
//!              │
//!              └─────► Failed      draft or list unavailable, or a store write failed
//! ```
//!
//! Errors inside a row are recorded in its Status cell and the loop moves
//! on. Only errors outside a row's scope end the run as `Failed`; rows
//! written before that stay written, and no checkpoint is saved.

use tracing::{debug, error, info, warn};

use crate::dispatch::event::{EventSink, LogLevel, MergeEvent, RowStatus, RunState};
use crate::dispatch::handle::CancelToken;
use crate::dispatch::progress::ProgressBasis;
use crate::dispatch::{RunPlan, RunSettings};
use crate::error::{Result, RowError, RowErrorKind};
use crate::model::outcome::RowOutcome;
use crate::model::row::{pad_row, Cell, VisibleHeaders};
use crate::model::template::{Template, TemplateAttachment};
use crate::policy::attachments::FlagColumn;
use crate::policy::recipients::{recipient, resolve_recipients};
use crate::store::checkpoint::CheckpointStore;
use crate::store::{count_recipients, ensure_control_columns, ControlColumns, RowSource, RowStore};
use crate::template::{Placeholders, TemplateSource};
use crate::transport::{OutgoingMessage, Transport};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        sent: usize,
        failed: usize,
    },
    Stopped {
        sent: usize,
        failed: usize,
        pending: usize,
        /// Row the next resume starts at. It was not sent in this run.
        resume_row: usize,
    },
    Failed {
        message: String,
    },
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            Self::Completed { .. } => RunState::Completed,
            Self::Stopped { .. } => RunState::Stopped,
            Self::Failed { .. } => RunState::Failed,
        }
    }
}

/// Per-run inputs derived once from the header row.
struct Layout {
    visible: VisibleHeaders,
    headers: Vec<String>,
    controls: ControlColumns,
    flag: FlagColumn,
    placeholders: std::result::Result<Placeholders, RowError>,
}

#[derive(Debug, Default)]
struct Counters {
    sent: usize,
    failed: usize,
    processed: usize,
}

/// Sequential dispatcher for one run at a time.
#[derive(Debug, Clone)]
pub struct Controller {
    settings: RunSettings,
    events: EventSink,
    cancel: CancelToken,
}

impl Controller {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            events: EventSink::none(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops this controller at the next row boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Run to completion, cancellation or failure.
    pub fn run(
        &self,
        templates: &dyn TemplateSource,
        rows: &dyn RowSource,
        transport: &mut dyn Transport,
        checkpoint: &CheckpointStore,
        plan: &RunPlan,
    ) -> RunOutcome {
        self.events.emit(MergeEvent::State(RunState::Running));
        info!(
            draft = %plan.draft_id,
            start_row = plan.start_row,
            resume = plan.resume,
            transport = transport.name(),
            "Run started"
        );

        let outcome = match self.execute(templates, rows, transport, checkpoint, plan) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Run failed");
                let message = e.to_string();
                self.events.emit(MergeEvent::Fatal(message.clone()));
                RunOutcome::Failed { message }
            }
        };

        self.events.emit(MergeEvent::State(outcome.state()));
        outcome
    }

    fn execute(
        &self,
        templates: &dyn TemplateSource,
        rows: &dyn RowSource,
        transport: &mut dyn Transport,
        checkpoint: &CheckpointStore,
        plan: &RunPlan,
    ) -> Result<RunOutcome> {
        let template = templates.fetch(&plan.draft_id)?;
        let mut store = rows.open()?;
        let layout = self.layout(store.as_mut());

        let total = plan
            .total_rows
            .unwrap_or_else(|| count_recipients(store.as_ref()));
        let basis = ProgressBasis::new(Some(total), plan.start_row, store.last_row());

        self.say(LogLevel::Info, format!("Starting from Row {}", plan.start_row));
        if layout.flag == FlagColumn::Missing {
            warn!("Conditional attachments enabled but no attachment column found");
            self.say(
                LogLevel::Warning,
                "'Send Attachments' column not found. Skipping attachments.",
            );
        }

        let mut counters = Counters::default();
        let mut first_attempt = true;

        for idx in plan.start_row..=store.last_row() {
            if self.cancel.is_cancelled() {
                return self.stop(store.as_mut(), &layout, checkpoint, idx, &counters, basis);
            }

            counters.processed += 1;
            self.events
                .emit(MergeEvent::Progress(basis.percent(idx, counters.processed)));

            let Some(cells) = store.row(idx) else {
                continue;
            };
            let mut values = cells.to_vec();
            pad_row(&mut values, layout.headers.len());

            let Some(to) = recipient(&values, &layout.headers).map(String::from) else {
                debug!(row = idx, "No recipient, skipping");
                continue;
            };

            self.emit_row(idx, &values, RowStatus::Sending);
            let mark_resumed = plan.resume && first_attempt;
            first_attempt = false;

            match self.process_row(&template, &layout, &values, transport) {
                Ok(outcome) => {
                    counters.sent += 1;
                    record(store.as_mut(), &layout.controls, idx, &outcome)?;
                    let position = basis
                        .total()
                        .map_or_else(|| "?".to_string(), |t| t.to_string());
                    info!(row = idx, to = %to, outcome = %outcome, "Sent");
                    self.say(
                        LogLevel::Success,
                        format!("[{}/{position}] {outcome} to {to}", idx - 1),
                    );

                    if mark_resumed {
                        record(store.as_mut(), &layout.controls, idx, &RowOutcome::Resumed)?;
                        self.emit_row(idx, &values, RowStatus::Resumed);
                    } else {
                        self.emit_row(idx, &values, RowStatus::Sent);
                    }
                }
                Err(err) => {
                    counters.failed += 1;
                    let stage = match err.kind {
                        RowErrorKind::Personalization => "personalization",
                        RowErrorKind::AttachmentPolicy => "attachment policy",
                        RowErrorKind::Compose => "compose",
                        RowErrorKind::Transport => "transport",
                    };
                    warn!(row = idx, to = %to, stage, error = %err, "Row failed");
                    record(
                        store.as_mut(),
                        &layout.controls,
                        idx,
                        &RowOutcome::Error(err.message.clone()),
                    )?;
                    self.say(LogLevel::Error, format!("Failed to {to}: {err}"));
                    self.emit_row(idx, &values, RowStatus::Error);
                }
            }
        }

        store.persist()?;
        checkpoint.clear()?;
        info!(sent = counters.sent, failed = counters.failed, "Run completed");
        self.events.emit(MergeEvent::Progress(100));
        self.events.emit(MergeEvent::Finished {
            sent: counters.sent,
            failed: counters.failed,
        });
        Ok(RunOutcome::Completed {
            sent: counters.sent,
            failed: counters.failed,
        })
    }

    fn layout(&self, store: &mut dyn RowStore) -> Layout {
        // Placeholders come from the header row as loaded, before control
        // columns are appended.
        let visible = VisibleHeaders::from_headers(store.headers());
        let controls = ensure_control_columns(store);
        let headers = store.headers().to_vec();
        let flag = self.settings.attachments.locate(&headers);
        let placeholders = Placeholders::compile(&visible.names)
            .map_err(|e| RowError::new(RowErrorKind::Personalization, e.to_string()));
        Layout {
            visible,
            headers,
            controls,
            flag,
            placeholders,
        }
    }

    fn process_row(
        &self,
        template: &Template,
        layout: &Layout,
        values: &[Cell],
        transport: &mut dyn Transport,
    ) -> std::result::Result<RowOutcome, RowError> {
        let placeholders = layout.placeholders.as_ref().map_err(Clone::clone)?;
        let projected = layout.visible.project(values);
        let subject = placeholders.resolve(&template.subject, &projected);
        let html_body = placeholders.resolve(&template.body, &projected);

        let envelope = resolve_recipients(values, &layout.headers, &self.settings.recipients);
        let decision = self.settings.attachments.evaluate(layout.flag, values)?;
        debug!(
            to = %envelope.to,
            include = decision.include,
            reason = %decision.reason,
            "Attachment decision"
        );
        let attachments: &[TemplateAttachment] = if decision.include {
            &template.attachments
        } else {
            &[]
        };

        let message = OutgoingMessage {
            from: &self.settings.sender,
            to: envelope.to,
            cc: envelope.cc,
            bcc: envelope.bcc,
            subject,
            html_body,
            attachments,
        };
        transport.send(&message)?;
        Ok(RowOutcome::sent(template.has_attachments(), decision.include))
    }

    fn stop(
        &self,
        store: &mut dyn RowStore,
        layout: &Layout,
        checkpoint: &CheckpointStore,
        idx: usize,
        counters: &Counters,
        basis: ProgressBasis,
    ) -> Result<RunOutcome> {
        record(store, &layout.controls, idx, &RowOutcome::Stopped)?;
        store.persist()?;
        checkpoint.save_stopped(idx, &self.settings)?;

        let pending = basis.pending(idx);
        info!(
            row = idx,
            sent = counters.sent,
            failed = counters.failed,
            pending,
            "Run stopped"
        );
        self.say(
            LogLevel::Warning,
            format!("Progress saved. Resume will start from Email #{}.", idx - 1),
        );
        self.events.emit(MergeEvent::Stopped {
            sent: counters.sent,
            failed: counters.failed,
            pending,
        });
        Ok(RunOutcome::Stopped {
            sent: counters.sent,
            failed: counters.failed,
            pending,
            resume_row: idx,
        })
    }

    fn say(&self, level: LogLevel, message: impl Into<String>) {
        self.events.log(level, message);
    }

    fn emit_row(&self, index: usize, values: &[Cell], status: RowStatus) {
        self.events.emit(MergeEvent::Row {
            index,
            values: values.to_vec(),
            status,
        });
    }
}

/// Write `outcome` into its control cell.
fn record(
    store: &mut dyn RowStore,
    controls: &ControlColumns,
    idx: usize,
    outcome: &RowOutcome,
) -> Result<()> {
    store.write_cell(
        idx,
        controls.position(outcome.column()),
        &outcome.to_string(),
        outcome.mark(),
    )
}
