#[cfg(feature = "inprocess")]
pub mod inprocess;

use std::path::Path;

use error_stack::{AttachmentKind, FrameKind, Report};
use stemsplit_worker::DiagnosticWriter;
use thiserror::Error;

/// The long-running transform that a job supervises. The supervisor knows nothing about what
/// it does, only that it reads `input`, writes its artifacts somewhere under `output_dir`,
/// and writes free-form text to `diagnostics` along the way.
#[async_trait::async_trait]
pub trait Computation: Send + Sync + 'static {
    /// Run the computation to completion.
    async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        diagnostics: DiagnosticWriter,
    ) -> Result<(), Report<ComputationError>>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputationError {
    #[error("Computation failed to start")]
    DidNotStart,
    #[error("Computation failed")]
    Failed,
    #[error("Computation was lost before it finished")]
    Lost,
}

/// Flatten a report into a single line for someone who will never see the report itself.
/// Each context is followed by the printable attachments that were added to it, outermost
/// context first.
pub fn describe_report<C>(report: &Report<C>) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut attachments: Vec<String> = Vec::new();

    // Frames are yielded outermost first, and an attachment comes before the context it
    // was attached to. Attachments are put back in the order they were added.
    for frame in report.frames() {
        match frame.kind() {
            FrameKind::Context(context) => {
                parts.push(context.to_string());
                parts.append(&mut attachments);
            }
            FrameKind::Attachment(AttachmentKind::Printable(attachment)) => {
                attachments.insert(0, attachment.to_string());
            }
            FrameKind::Attachment(_) => {}
        }
    }
    parts.append(&mut attachments);

    let mut message: Vec<String> = Vec::with_capacity(parts.len());
    for part in parts {
        if !part.is_empty() && !message.contains(&part) {
            message.push(part);
        }
    }

    message.join(": ")
}

#[cfg(test)]
mod tests {
    use error_stack::ResultExt;

    use super::*;

    #[test]
    fn describe_includes_contexts_and_attachments() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let report = Err::<(), _>(io_error)
            .change_context(ComputationError::DidNotStart)
            .attach_printable("Failed to start demucs")
            .expect_err("report");

        let message = describe_report(&report);
        assert!(message.starts_with("Computation failed to start"), "{message}");
        assert!(message.contains("Failed to start demucs"), "{message}");
        assert!(message.contains("no such file"), "{message}");
    }

    #[test]
    fn describe_skips_repeats() {
        let report = Report::new(ComputationError::Failed)
            .attach_printable("exit code 1")
            .attach_printable("exit code 1");
        assert_eq!(describe_report(&report), "Computation failed: exit code 1");
    }
}
