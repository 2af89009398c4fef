use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use futures::Stream;
use stemsplit_worker::{DiagnosticWriter, ProgressSink, ProgressSnapshot};
use tokio::{sync::OwnedSemaphorePermit, task::JoinHandle};
use uuid::Uuid;

use crate::{
    completion::{completion_signal, Completion, CompletionReceiver},
    computation::Computation,
    emitter::{job_events, JobEvent},
    scratch::Scratch,
    settings::{ArtifactLayout, JobSettings},
    worker::{spawn_worker, WorkerPayload},
};

/// A single run of the computation, from materialized input to terminal event. A job belongs
/// to whoever started it and is never shared.
pub struct Job {
    pub(crate) id: Uuid,
    pub(crate) scratch: Scratch,
    pub(crate) progress: Arc<ProgressSink>,
    pub(crate) completion: CompletionReceiver,
    pub(crate) layout: ArtifactLayout,
    pub(crate) poll_interval: Duration,
    pub(crate) worker: JoinHandle<()>,
}

impl Job {
    /// Start the computation on `input`, which must already live inside `scratch`. This is
    /// internal and called from the job manager.
    pub(crate) fn start(
        computation: Arc<dyn Computation>,
        scratch: Scratch,
        input: PathBuf,
        settings: &JobSettings,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Job {
        let id = Uuid::now_v7();
        let progress = Arc::new(ProgressSink::new());
        let (completion_tx, completion) = completion_signal();

        let worker = spawn_worker(
            computation,
            WorkerPayload {
                job_id: id,
                input,
                output_dir: scratch.output_dir(),
                diagnostics: DiagnosticWriter::new(progress.clone()),
                completion: completion_tx,
                scratch: scratch.lease(),
                permit,
            },
        );

        Job {
            id,
            scratch,
            progress,
            completion,
            layout: settings.layout.clone(),
            poll_interval: settings.poll_interval,
            worker,
        }
    }

    /// The unique ID of the job
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The job's scratch directory. It no longer exists once the job has ended.
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn completion(&self) -> Completion {
        self.completion.current()
    }

    /// Consume the job and return its event sequence. Dropping the stream before it ends
    /// abandons the job: the scratch directory is reclaimed right away and the computation is
    /// left to finish on its own. Anything it writes after that is removed once it returns.
    pub fn events(self) -> impl Stream<Item = JobEvent> + Send + 'static {
        job_events(self)
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("scratch", &self.scratch.path())
            .field("completion", &self.completion.current())
            .finish()
    }
}
