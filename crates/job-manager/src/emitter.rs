use futures::Stream;
use tokio::time::MissedTickBehavior;
use tracing::{event, Level};
use uuid::Uuid;

use crate::{
    completion::Completion,
    job::Job,
    scratch::{locate_outputs, ArtifactSet},
};

/// An event in a job's lifetime, in the order the observer should see them.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// The latest progress estimate, from 0 to 100.
    Progress(f64),
    /// The job failed. No more events follow.
    Error(String),
    /// The job succeeded with these artifacts. No more events follow.
    Done(ArtifactSet),
}

impl JobEvent {
    /// True for the events that end a job's event sequence.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress(_))
    }
}

/// Logs when the observer stops listening before the job ends.
struct ObserverGuard {
    job_id: Uuid,
    finished: bool,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if !self.finished {
            event!(
                Level::INFO,
                job_id = %self.job_id,
                "Observer went away, detaching from job"
            );
        }
    }
}

/// Turn a job into its event sequence: a [JobEvent::Progress] every poll interval while the
/// computation runs, then exactly one terminal event. The scratch directory is reclaimed
/// before the terminal event is yielded, or when the stream is dropped, whichever comes first.
pub(crate) fn job_events(job: Job) -> impl Stream<Item = JobEvent> + Send + 'static {
    let Job {
        id,
        scratch,
        progress,
        mut completion,
        layout,
        poll_interval,
        worker,
    } = job;

    // Dropping the handle detaches it. The worker still runs to the end, and if nobody is
    // listening by then its outcome is discarded.
    drop(worker);

    async_stream::stream! {
        let mut guard = ObserverGuard { job_id: id, finished: false };
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Completion wakes the loop right away; the ticker bounds how stale progress
            // can get.
            let ticked = tokio::select! {
                biased;
                _ = completion.changed() => false,
                _ = ticker.tick() => true,
            };

            // Read the outcome after waking so that a job which finished since the last
            // tick ends with its terminal event instead of one more progress update.
            let terminal = match completion.current() {
                Completion::Running => {
                    if ticked {
                        yield JobEvent::Progress(progress.snapshot().percent);
                    }
                    continue;
                }
                Completion::Failed(message) => {
                    event!(Level::INFO, job_id = %id, %message, "Job failed");
                    JobEvent::Error(message)
                }
                Completion::Succeeded => {
                    match locate_outputs(&scratch.output_dir(), &layout).await {
                        Ok(artifacts) => {
                            event!(Level::INFO, job_id = %id, artifacts = artifacts.len(), "Job finished");
                            JobEvent::Done(artifacts)
                        }
                        Err(e) => {
                            event!(Level::WARN, job_id = %id, error = ?e, "Job output is incomplete");
                            JobEvent::Error(e.current_context().to_string())
                        }
                    }
                }
            };

            scratch.reclaim().await;
            guard.finished = true;
            yield terminal;
            break;
        }
    }
}
