//! Worker-side code shared between the stemsplit supervisor and the computations it runs.
//!
//! A computation never sees the job it belongs to. It is handed a [DiagnosticWriter] and
//! writes whatever free-form text it produces into it. The [ProgressSink] behind the writer
//! picks percentages out of that text, and the supervisor reads them back with
//! [ProgressSink::snapshot].

mod progress;

pub use progress::{parse_percent, DiagnosticWriter, ProgressSink, ProgressSnapshot};
