use std::sync::Arc;

use error_stack::{Report, ResultExt};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{event, instrument, Level};

use crate::{computation::Computation, job::Job, scratch::Scratch, settings::JobSettings};


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Failed to prepare job input")]
    Input,
    #[error("Job manager is not accepting new jobs")]
    Closed,
}

/// Starts jobs for a single kind of computation.
pub struct JobManager {
    computation: Arc<dyn Computation>,
    settings: JobSettings,
    job_semaphore: Arc<Semaphore>,
}

impl JobManager {
    pub fn new(computation: impl Computation, settings: JobSettings) -> Self {
        let max_concurrent_jobs = settings
            .max_concurrent_jobs
            .map_or(Semaphore::MAX_PERMITS, |n| n.get().min(Semaphore::MAX_PERMITS));

        Self {
            computation: Arc::new(computation),
            job_semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            settings,
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Write `input` to a fresh scratch directory and start the computation on it. If the
    /// concurrency limit has been reached, this waits for a running computation to finish.
    ///
    /// Nothing is left behind if this returns an error.
    #[instrument(skip(self, input), fields(size = input.len()))]
    pub async fn start(&self, input: &[u8], filename: &str) -> Result<Job, Report<JobError>> {
        let permit = self
            .job_semaphore
            .clone()
            .acquire_owned()
            .await
            .change_context(JobError::Closed)?;

        let scratch = Scratch::create(self.settings.scratch_root.as_deref())
            .change_context(JobError::Input)?;
        let input_path = scratch
            .materialize(input, filename)
            .await
            .change_context(JobError::Input)?;

        let job = Job::start(
            self.computation.clone(),
            scratch,
            input_path,
            &self.settings,
            Some(permit),
        );
        event!(Level::INFO, job_id = %job.id(), "Started job");

        Ok(job)
    }

    /// Stop accepting new jobs. Jobs that are already running are not affected, and calls to
    /// [JobManager::start] that are waiting for a slot fail with [JobError::Closed].
    pub fn close(&self) {
        self.job_semaphore.close();
    }
}
