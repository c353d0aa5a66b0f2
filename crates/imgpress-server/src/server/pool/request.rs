use imgpress_core::{Job, Result};
use tokio::sync::oneshot;

/// Single-use channel a worker answers a submission on.
///
/// A oneshot sender never blocks, so a worker can always hand back its
/// outcome even when the submitter stopped waiting; the value is then
/// dropped.
pub type Reply<T> = oneshot::Sender<Result<T>>;

/// A queued job paired with the channel its outcome goes back on.
pub struct WorkRequest<J: Job> {
    pub job: J,
    pub reply: Reply<J::Output>,
}
