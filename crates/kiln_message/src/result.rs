//! Outcome channel attached to every message

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Status of a [`MessageResult`].
///
/// Starts at `InProgress` and transitions monotonically to exactly one
/// terminal status; later transition attempts are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// No terminal outcome recorded yet
    InProgress,
    /// A handler serviced the message
    Success,
    /// A handler or the coordinator recorded an error
    Failed,
    /// The message's cancellation token was observed cancelled
    Cancelled,
    /// The message's timeout elapsed before delivery
    TimedOut,
}

impl ResultStatus {
    /// Check whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultStatus::InProgress)
    }
}

struct ResultInner {
    status: ResultStatus,
    message: String,
    payload: Option<Box<dyn Any + Send + Sync>>,
}

/// Shared outcome channel.
///
/// Cloning hands out another observer of the same underlying state, so the
/// original sender keeps seeing the final status after the coordinator has
/// taken ownership of a deferred message.
#[derive(Clone)]
pub struct MessageResult {
    inner: Arc<RwLock<ResultInner>>,
}

impl MessageResult {
    /// Create a result in the `InProgress` state
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ResultInner {
                status: ResultStatus::InProgress,
                message: String::new(),
                payload: None,
            })),
        }
    }

    /// Record success. Ignored if a terminal status was already recorded.
    pub fn flag_success(&self, message: impl Into<String>) {
        self.transition(ResultStatus::Success, message);
    }

    /// Record failure. Ignored if a terminal status was already recorded.
    pub fn flag_failure(&self, message: impl Into<String>) {
        self.transition(ResultStatus::Failed, message);
    }

    pub(crate) fn flag_cancelled(&self, message: impl Into<String>) {
        self.transition(ResultStatus::Cancelled, message);
    }

    pub(crate) fn flag_timed_out(&self, message: impl Into<String>) {
        self.transition(ResultStatus::TimedOut, message);
    }

    fn transition(&self, status: ResultStatus, message: impl Into<String>) {
        let mut inner = self.inner.write();
        if inner.status.is_terminal() {
            return;
        }
        inner.status = status;
        inner.message = message.into();
    }

    /// Check whether the recorded status denotes success
    pub fn succeeded(&self) -> bool {
        self.inner.read().status == ResultStatus::Success
    }

    /// Get the current status
    pub fn status(&self) -> ResultStatus {
        self.inner.read().status
    }

    /// Check whether a terminal status has been recorded
    pub fn is_terminal(&self) -> bool {
        self.inner.read().status.is_terminal()
    }

    /// Get the human-readable status message
    pub fn status_message(&self) -> String {
        self.inner.read().message.clone()
    }

    /// Attach a type-erased payload, replacing any previous one
    pub fn set_payload<P: Any + Send + Sync>(&self, payload: P) {
        self.inner.write().payload = Some(Box::new(payload));
    }

    /// Check whether a payload is attached
    pub fn has_payload(&self) -> bool {
        self.inner.read().payload.is_some()
    }

    /// Remove and downcast the payload.
    ///
    /// Returns `None` if no payload is attached or the type does not match;
    /// a mismatched payload is left in place.
    pub fn take_payload<P: Any + Send + Sync>(&self) -> Option<P> {
        let mut inner = self.inner.write();
        match inner.payload.take() {
            Some(boxed) => match boxed.downcast::<P>() {
                Ok(payload) => Some(*payload),
                Err(boxed) => {
                    inner.payload = Some(boxed);
                    None
                }
            },
            None => None,
        }
    }

    /// Check whether two handles observe the same underlying state
    pub fn same_channel(&self, other: &MessageResult) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for MessageResult {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MessageResult")
            .field("status", &inner.status)
            .field("message", &inner.message)
            .field("has_payload", &inner.payload.is_some())
            .finish()
    }
}
