use std::{path::PathBuf, sync::Arc};

use error_stack::ResultExt;
use stemsplit_worker::DiagnosticWriter;
use tokio::{sync::OwnedSemaphorePermit, task::JoinHandle};
use tracing::{event, instrument, Instrument, Level, Span};
use uuid::Uuid;

use crate::{
    completion::CompletionSender,
    computation::{describe_report, Computation, ComputationError},
    scratch::ScratchLease,
};

/// Everything a worker needs to run one job's computation.
pub(crate) struct WorkerPayload {
    pub job_id: Uuid,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub diagnostics: DiagnosticWriter,
    pub completion: CompletionSender,
    /// Cleans up output the computation writes after its job was abandoned.
    pub scratch: ScratchLease,
    /// Held until the computation returns, so that detached workers still count against
    /// the concurrency limit.
    pub permit: Option<OwnedSemaphorePermit>,
}

/// Start the computation on its own task. The returned handle can be dropped to detach from
/// the worker; the outcome is always written to the payload's [CompletionSender].
pub(crate) fn spawn_worker(
    computation: Arc<dyn Computation>,
    payload: WorkerPayload,
) -> JoinHandle<()> {
    tokio::task::spawn(run_worker(Span::current(), computation, payload))
}

#[instrument(
    level = Level::INFO,
    name = "worker",
    parent = &parent_span,
    skip_all,
    fields(job_id = %payload.job_id)
)]
async fn run_worker(
    parent_span: Span,
    computation: Arc<dyn Computation>,
    payload: WorkerPayload,
) {
    let WorkerPayload {
        job_id: _,
        input,
        output_dir,
        diagnostics,
        completion,
        scratch,
        permit,
    } = payload;

    // The computation runs on a task of its own so that a panic inside it comes back to us
    // as a JoinError instead of taking the completion signal down with it.
    let computation_task = tokio::task::spawn(
        async move { computation.run(&input, &output_dir, diagnostics).await }
            .in_current_span(),
    );

    let result = match computation_task.await {
        Ok(result) => result,
        Err(e) => Err(e).change_context(ComputationError::Lost),
    };
    // Released before the permit, so a freed slot never leaves an abandoned job's output behind.
    if scratch.is_abandoned() {
        event!(Level::INFO, "Job was abandoned, removing its output");
    }
    scratch.release().await;
    drop(permit);

    match result {
        Ok(()) => {
            event!(Level::INFO, "Computation succeeded");
            completion.succeed();
        }
        Err(e) => {
            event!(Level::WARN, error = ?e, "Computation failed");
            completion.fail(describe_report(&e));
        }
    }
}
