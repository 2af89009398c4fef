//! The one-way signal a worker uses to say how its job ended.

use tokio::sync::watch;

/// Written when the worker goes away without recording an outcome, for example because the
/// computation panicked or the worker task was aborted.
pub const WORKER_VANISHED: &str = "worker exited without reporting a result";

/// The state of a job's computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Running,
    Succeeded,
    Failed(String),
}

impl Completion {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Completion::Running)
    }
}

/// Create a new signal in the [Completion::Running] state.
pub fn completion_signal() -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = watch::channel(Completion::Running);
    (CompletionSender { tx: Some(tx) }, CompletionReceiver { rx })
}

/// The write half of a completion signal. Writing consumes the sender, so the signal can
/// only ever move out of [Completion::Running] once.
#[derive(Debug)]
pub struct CompletionSender {
    tx: Option<watch::Sender<Completion>>,
}

impl CompletionSender {
    pub fn succeed(mut self) {
        self.finish(Completion::Succeeded);
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.finish(Completion::Failed(message.into()));
    }

    fn finish(&mut self, completion: Completion) {
        if let Some(tx) = self.tx.take() {
            // This works even if every receiver is gone.
            tx.send_replace(completion);
        }
    }
}

impl Drop for CompletionSender {
    fn drop(&mut self) {
        self.finish(Completion::Failed(WORKER_VANISHED.to_string()));
    }
}

/// The read half of a completion signal. Reads never consume the value, and clones all see
/// the same signal.
#[derive(Debug, Clone)]
pub struct CompletionReceiver {
    rx: watch::Receiver<Completion>,
}

impl CompletionReceiver {
    /// The current state of the signal.
    pub fn current(&self) -> Completion {
        self.rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_finished()
    }

    /// Resolve the next time the signal changes. If the signal can no longer change, this
    /// never resolves, so it is always safe to use as one branch of a `select!`.
    pub async fn changed(&mut self) {
        if self.rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Wait until the signal leaves [Completion::Running] and return the outcome.
    pub async fn wait(&mut self) -> Completion {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if current.is_finished() {
                return current;
            }

            if self.rx.changed().await.is_err() {
                // The sender always writes before it goes away, so this is just the final value.
                return self.current();
            }
        }
    }
}
