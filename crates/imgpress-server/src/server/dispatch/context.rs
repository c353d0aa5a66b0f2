use imgpress_core::Error;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A deadline plus a cancellation token.
///
/// Child contexts never outlive their parent: the child's deadline is the
/// earlier of the two and cancelling the parent cancels every child.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Instant,
    timeout: Duration,
    token: CancellationToken,
}

impl RequestContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            timeout,
            token: CancellationToken::new(),
        }
    }

    /// Derives a context that expires after `timeout` or when `self` does,
    /// whichever comes first.
    pub fn child(&self, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = self.deadline.min(now + timeout);
        Self {
            deadline,
            timeout: deadline.saturating_duration_since(now),
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Effective timeout this context was created with.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why this context is done, or `None` while it is still live.
    /// Cancellation takes precedence over an elapsed deadline.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            Some(Error::RequestCancelled)
        } else if Instant::now() >= self.deadline {
            Some(self.timeout_error())
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Error {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Error::RequestCancelled,
            () = tokio::time::sleep_until(self.deadline) => self.timeout_error(),
        }
    }

    const fn timeout_error(&self) -> Error {
        Error::Timeout {
            after: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_context_is_live() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_done());
        assert_eq!(ctx.err(), None);
        assert!(ctx.remaining() <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn deadline_resolves_done_with_timeout() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(20));
        let err = ctx.done().await;
        assert_eq!(
            err,
            Error::Timeout {
                after: Duration::from_millis(20)
            }
        );
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn cancel_wins_over_deadline() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(10));
        ctx.cancel();
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(ctx.err(), Some(Error::RequestCancelled));
        assert_eq!(ctx.done().await, Error::RequestCancelled);
    }

    #[tokio::test]
    async fn child_deadline_is_clamped_to_parent() {
        let parent = RequestContext::with_timeout(Duration::from_millis(50));
        let child = parent.child(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
        assert!(child.timeout() <= Duration::from_millis(50));

        let shorter = parent.child(Duration::from_millis(5));
        assert!(shorter.deadline() < parent.deadline());
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child_but_not_the_reverse() {
        let parent = RequestContext::with_timeout(Duration::from_secs(5));
        let child = parent.child(Duration::from_secs(5));
        let sibling = parent.child(Duration::from_secs(5));

        sibling.cancel();
        assert!(!parent.is_done());
        assert!(!child.is_done());

        parent.cancel();
        assert_eq!(child.err(), Some(Error::RequestCancelled));
    }
}
