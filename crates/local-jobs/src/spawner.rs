//! Run the computation as a child process on the local system. Everything the process writes
//! to stdout and stderr is fed into the job's [DiagnosticWriter].

use std::{ffi::OsString, path::Path, process::Stdio};

use error_stack::{Report, ResultExt};
use futures::stream::TryStreamExt;
use stemsplit_job_manager::{Computation, ComputationError};
use stemsplit_worker::DiagnosticWriter;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    task::JoinHandle,
};
use tokio_stream::wrappers::SplitStream;
use tracing::{event, Level};

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// A program and its arguments. `{input}` and `{output}` in an argument are replaced with the
/// input file and the output directory of the job.
///
/// The child is not killed when the job is abandoned. It runs until it exits on its own.
#[derive(Debug, Clone)]
pub struct LocalComputation {
    pub program: String,
    pub args: Vec<String>,
}

impl LocalComputation {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run Demucs, writing MP3 stems into the output directory.
    pub fn demucs(program: impl Into<String>) -> Self {
        Self::new(
            program,
            ["--mp3", "-o", OUTPUT_PLACEHOLDER, INPUT_PLACEHOLDER],
        )
    }

    fn command(&self, input: &Path, output_dir: &Path) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(self.args.iter().map(|arg| expand_arg(arg, input, output_dir)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

fn expand_arg(arg: &str, input: &Path, output_dir: &Path) -> OsString {
    match arg {
        // Whole-argument placeholders keep paths that are not valid UTF-8 intact.
        INPUT_PLACEHOLDER => input.as_os_str().to_owned(),
        OUTPUT_PLACEHOLDER => output_dir.as_os_str().to_owned(),
        arg => arg
            .replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
            .replace(OUTPUT_PLACEHOLDER, &output_dir.to_string_lossy())
            .into(),
    }
}

#[async_trait::async_trait]
impl Computation for LocalComputation {
    async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        diagnostics: DiagnosticWriter,
    ) -> Result<(), Report<ComputationError>> {
        let mut child = self
            .command(input, output_dir)
            .spawn()
            .change_context(ComputationError::DidNotStart)
            .attach_printable_lazy(|| format!("Failed to start {}", self.program))?;

        event!(Level::DEBUG, program = %self.program, pid = child.id(), "Started child process");

        let stdout = child
            .stdout
            .take()
            .map(|stdout| tokio::task::spawn(forward_output(stdout, diagnostics.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|stderr| tokio::task::spawn(forward_output(stderr, diagnostics)));

        let status = child.wait().await.change_context(ComputationError::Lost)?;

        // Error messages usually go to stderr, so prefer its last line.
        let stderr_line = finish_forwarding(stderr).await;
        let stdout_line = finish_forwarding(stdout).await;

        if status.success() {
            return Ok(());
        }

        let code = status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string());
        let mut report = Report::new(ComputationError::Failed)
            .attach_printable(format!("Exited with code {code}"));
        if let Some(line) = stderr_line.or(stdout_line) {
            report = report.attach_printable(line);
        }

        Err(report)
    }
}

/// Feed everything `reader` produces into `diagnostics`, one fragment at a time, and return
/// the last non-blank fragment. Progress bars redraw with a bare carriage return, so that
/// ends a fragment just like a newline does.
async fn forward_output<R>(reader: R, diagnostics: DiagnosticWriter) -> Option<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut chunks = SplitStream::new(BufReader::new(reader).split(b'\r'));
    let mut last_line = None;

    while let Ok(Some(chunk)) = chunks.try_next().await {
        let text = String::from_utf8_lossy(&chunk);
        for line in text.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            diagnostics.write(line);
            last_line = Some(line.to_string());
        }
    }

    last_line
}

async fn finish_forwarding(handle: Option<JoinHandle<Option<String>>>) -> Option<String> {
    match handle {
        Some(handle) => handle.await.ok().flatten(),
        None => None,
    }
}
