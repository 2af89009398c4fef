//! Supervise a long-running computation and stream its progress.
//!
//! A [JobManager] writes an uploaded input into a job-scoped [Scratch] directory and runs its
//! [Computation] on a worker task. The computation writes free-form diagnostics into a
//! [DiagnosticWriter], and [Job::events] polls the resulting progress until the computation
//! ends, yielding zero or more [JobEvent::Progress] events followed by exactly one
//! [JobEvent::Done] or [JobEvent::Error]. Scratch storage is reclaimed on every path out.

pub mod completion;
pub mod computation;
mod emitter;
mod job;
mod manager;
pub mod scratch;
mod settings;
#[cfg(test)]
mod test_util;
mod worker;

pub use completion::{Completion, CompletionReceiver, CompletionSender};
pub use computation::{describe_report, Computation, ComputationError};
pub use emitter::JobEvent;
pub use job::Job;
pub use manager::{JobError, JobManager};
pub use scratch::{ArtifactSet, LocateError, Scratch, ScratchError, ScratchLease};
pub use settings::{ArtifactLayout, JobSettings};
pub use stemsplit_worker::{DiagnosticWriter, ProgressSink, ProgressSnapshot};
