//! Run a computation as a closure in the same process as the supervisor. This is only really
//! useful for tests and for embedding a pure-Rust transform.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use error_stack::Report;
use stemsplit_worker::DiagnosticWriter;

use super::{Computation, ComputationError};

/// Everything the closure gets to work with.
pub struct InProcessTaskInfo {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub diagnostics: DiagnosticWriter,
}

pub struct InProcessComputation<F, FUNC>
where
    F: Future<Output = Result<(), Report<ComputationError>>> + Send + 'static,
    FUNC: Fn(InProcessTaskInfo) -> F + Send + Sync + 'static,
{
    task_fn: FUNC,
}

impl<F, FUNC> InProcessComputation<F, FUNC>
where
    F: Future<Output = Result<(), Report<ComputationError>>> + Send + 'static,
    FUNC: Fn(InProcessTaskInfo) -> F + Send + Sync + 'static,
{
    pub fn new(task_fn: FUNC) -> Self {
        Self { task_fn }
    }
}

#[async_trait]
impl<F, FUNC> Computation for InProcessComputation<F, FUNC>
where
    F: Future<Output = Result<(), Report<ComputationError>>> + Send + 'static,
    FUNC: Fn(InProcessTaskInfo) -> F + Send + Sync + 'static,
{
    async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        diagnostics: DiagnosticWriter,
    ) -> Result<(), Report<ComputationError>> {
        (self.task_fn)(InProcessTaskInfo {
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            diagnostics,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stemsplit_worker::ProgressSink;

    use super::*;

    #[tokio::test]
    async fn passes_paths_and_diagnostics_through() {
        let computation = InProcessComputation::new(|info: InProcessTaskInfo| async move {
            info.diagnostics.write("halfway 50%");
            assert_eq!(info.input, PathBuf::from("/in/song.mp3"));
            assert_eq!(info.output_dir, PathBuf::from("/out"));
            Ok(())
        });

        let sink = Arc::new(ProgressSink::new());
        computation
            .run(
                Path::new("/in/song.mp3"),
                Path::new("/out"),
                DiagnosticWriter::new(sink.clone()),
            )
            .await
            .expect("computation succeeds");

        assert_eq!(sink.snapshot().percent, 50.0);
    }

    #[tokio::test]
    async fn returns_closure_errors() {
        let computation = InProcessComputation::new(|_info| async move {
            Err::<(), _>(Report::new(ComputationError::Failed).attach_printable("model not found"))
        });

        let err = computation
            .run(
                Path::new("in"),
                Path::new("out"),
                DiagnosticWriter::new(Arc::new(ProgressSink::new())),
            )
            .await
            .expect_err("computation fails");
        assert_eq!(err.current_context(), &ComputationError::Failed);
    }
}
