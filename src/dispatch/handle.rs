//! Running the controller on a worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info};

use crate::dispatch::controller::{Controller, RunOutcome};
use crate::dispatch::RunPlan;
use crate::store::{CheckpointStore, RowSource};
use crate::template::TemplateSource;
use crate::transport::Transport;

/// Cooperative stop flag, checked between rows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The collaborators and plan for one run, moved onto the worker.
pub struct Job {
    pub templates: Box<dyn TemplateSource + Send>,
    pub rows: Box<dyn RowSource>,
    pub transport: Box<dyn Transport>,
    pub checkpoint: CheckpointStore,
    pub plan: RunPlan,
}

/// A run in progress on its own thread.
pub struct RunHandle {
    cancel: CancelToken,
    thread: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Ask the run to stop. The row being sent finishes first.
    pub fn stop(&self) {
        info!("Stop requested");
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end.
    pub fn join(self) -> RunOutcome {
        self.thread.join().unwrap_or_else(|_| {
            error!("Worker thread panicked");
            RunOutcome::Failed {
                message: "worker thread panicked".to_string(),
            }
        })
    }
}

/// Start `job` on a new thread.
pub fn spawn(controller: Controller, job: Job) -> std::io::Result<RunHandle> {
    let cancel = controller.cancel_token();
    let thread = std::thread::Builder::new()
        .name("mailmerge-worker".into())
        .spawn(move || {
            let Job {
                templates,
                rows,
                mut transport,
                checkpoint,
                plan,
            } = job;
            controller.run(
                templates.as_ref(),
                rows.as_ref(),
                transport.as_mut(),
                &checkpoint,
                &plan,
            )
        })?;
    Ok(RunHandle { cancel, thread })
}
