use std::{sync::Arc, time::Instant};

use parking_lot::Mutex;

/// The latest progress estimate observed for a job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Completion percentage in `[0, 100]`. This is whatever the diagnostics said most
    /// recently, so it can go down as well as up.
    pub percent: f64,
    /// When `percent` was last replaced, or `None` if no percentage has been seen yet.
    pub updated: Option<Instant>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            percent: 0.0,
            updated: None,
        }
    }
}

/// Holds the latest progress estimate for a job. The worker side calls [ProgressSink::report]
/// and the supervisor side calls [ProgressSink::snapshot], from any thread.
#[derive(Debug, Default)]
pub struct ProgressSink {
    state: Mutex<ProgressSnapshot>,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for a percentage in a fragment of diagnostic output and record it. Fragments
    /// without one are ignored. Returns the recorded value, if any.
    ///
    /// The lock is only held long enough to copy the new value in, and nothing here
    /// allocates, so a writer is never held up by a slow reader.
    pub fn report(&self, fragment: &str) -> Option<f64> {
        let percent = parse_percent(fragment)?;
        let now = Instant::now();

        *self.state.lock() = ProgressSnapshot {
            percent,
            updated: Some(now),
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(percent, "progress reported");

        Some(percent)
    }

    /// The most recently recorded progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.state.lock()
    }
}

/// The capability a computation gets for reporting its diagnostics. It can be cloned freely
/// and handed to whatever reads the computation's output, but it only exposes writes.
#[derive(Debug, Clone)]
pub struct DiagnosticWriter {
    sink: Arc<ProgressSink>,
}

impl DiagnosticWriter {
    pub fn new(sink: Arc<ProgressSink>) -> Self {
        Self { sink }
    }

    /// Report a single fragment of output, such as one line.
    pub fn write(&self, fragment: &str) {
        self.sink.report(fragment);
    }

    /// Report a block of text, splitting it at newlines and carriage returns. Progress bars
    /// redraw themselves with `\r`, so one "line" can hold many updates.
    pub fn write_text(&self, text: &str) {
        for fragment in text.split(['\n', '\r']) {
            if !fragment.is_empty() {
                self.write(fragment);
            }
        }
    }
}

/// Find the last `<number>%` in `text` and return the number. Numbers outside of `[0, 100]`
/// are not treated as progress and the search continues to the left of them.
pub fn parse_percent(text: &str) -> Option<f64> {
    let mut end = text.len();
    while let Some(pos) = text[..end].rfind('%') {
        if let Some(value) = number_ending_at(&text[..pos]) {
            if (0.0..=100.0).contains(&value) {
                return Some(value);
            }
        }
        end = pos;
    }

    None
}

/// Parse the `\d+(\.\d+)?` that ends exactly at the end of `prefix`.
fn number_ending_at(prefix: &str) -> Option<f64> {
    let start = prefix
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit() || *b == b'.')
        .count();
    let candidate = &prefix[prefix.len() - start..];

    // A leading dot is punctuation ("...45%"), not part of the number.
    let candidate = candidate.trim_start_matches('.');
    if !candidate.ends_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    // Rejects things like "1.2.3".
    candidate.parse().ok()
}
