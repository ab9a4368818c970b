/// Typed per-request context threaded through every manager call.
///
/// Carries the request id for log correlation, an optional deadline and a
/// cancellation flag. Long cryptographic operations call [`RequestContext::check`]
/// between OpenPGP packets and bail out with `Cancelled` / `Timeout`.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::{Result, SignerError};

#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    /// A context with no deadline, used for startup work and tests.
    pub fn background() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A context carrying an externally supplied request id.
    pub fn with_request_id(request_id: Uuid) -> Self {
        Self {
            request_id,
            ..Self::background()
        }
    }

    /// Sets the deadline to `timeout` from now, keeping the request id.
    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Request cancellation; observed at the next checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Checkpoint: fails once the context is cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(SignerError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SignerError::Timeout);
            }
        }
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_passes_checkpoints() {
        let ctx = RequestContext::background();
        assert!(ctx.check().is_ok());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_cancel_trips_checkpoint() {
        let ctx = RequestContext::background();
        ctx.cancel();
        assert!(matches!(ctx.check(), Err(SignerError::Cancelled)));
    }

    #[test]
    fn test_expired_deadline_is_timeout() {
        let ctx = RequestContext::background().deadline_in(Duration::from_secs(0));
        assert!(matches!(ctx.check(), Err(SignerError::Timeout)));
    }

    #[test]
    fn test_deadline_in_keeps_request_id() {
        let id = Uuid::new_v4();
        let ctx = RequestContext::with_request_id(id).deadline_in(Duration::from_secs(30));
        assert_eq!(ctx.request_id(), id);
        assert!(ctx.remaining().is_some());
        assert!(ctx.check().is_ok());

        let expired = RequestContext::with_request_id(id).deadline_in(Duration::from_secs(0));
        assert!(matches!(expired.check(), Err(SignerError::Timeout)));
    }
}
