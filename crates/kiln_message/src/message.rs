//! The unit of communication carried across the bus

use std::any::{Any, TypeId};
use std::fmt;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::id::MessageId;
use crate::result::MessageResult;

/// Delivery category of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Notification fanned out to every subscriber
    Event,
    /// Request serviced by the first handler that claims it
    Command,
}

/// Delivery state of a message.
///
/// `InProgress` is the only non-terminal state. Once a terminal state is set
/// the coordinator stops delivering to further subscribers (events already
/// marked `Handled` keep fanning out).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Created, not yet resolved
    InProgress,
    /// A subscriber claimed and serviced the message
    Handled,
    /// Delivery completed without any subscriber claiming it
    Processed,
    /// A handler or the coordinator recorded an error
    Failed,
    /// The cancellation token was observed cancelled before or during delivery
    Cancelled,
    /// The timeout elapsed before delivery
    TimedOut,
}

impl DeliveryState {
    /// Check whether this state is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::InProgress)
    }
}

/// Completion callback invoked at most once with the resolved message.
pub type CompletionFn = Box<dyn FnOnce(&Message) + Send>;

/// Completion callbacks, one slot per terminal outcome.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) on_handled: Option<CompletionFn>,
    pub(crate) on_processed: Option<CompletionFn>,
    pub(crate) on_failure: Option<CompletionFn>,
    pub(crate) on_cancelled: Option<CompletionFn>,
    pub(crate) on_timeout: Option<CompletionFn>,
}

/// A message travelling through a coordinator.
///
/// Carries a type-erased payload, a shared [`MessageResult`] outcome channel,
/// an optional cancellation token, and optional timeout/delay durations.
/// Created as a transient value on the sender's side; `post` transfers
/// ownership to the coordinator while the sender keeps a cloned result handle.
pub struct Message {
    id: MessageId,
    kind: MessageKind,
    state: DeliveryState,
    payload_type: TypeId,
    payload: Box<dyn Any + Send + Sync>,
    result: MessageResult,
    token: Option<CancellationToken>,
    timeout: Option<Duration>,
    delay: Option<Duration>,
    created_at: Instant,
    pub(crate) callbacks: Callbacks,
}

impl Message {
    fn new<P: Any + Send + Sync>(kind: MessageKind, payload: P) -> Self {
        Self {
            id: MessageId::new(),
            kind,
            state: DeliveryState::InProgress,
            payload_type: TypeId::of::<P>(),
            payload: Box::new(payload),
            result: MessageResult::new(),
            token: None,
            timeout: None,
            delay: None,
            created_at: Instant::now(),
            callbacks: Callbacks::default(),
        }
    }

    /// Create an event carrying the given payload
    pub fn event<P: Any + Send + Sync>(payload: P) -> Self {
        Self::new(MessageKind::Event, payload)
    }

    /// Create a command carrying the given payload
    pub fn command<P: Any + Send + Sync>(payload: P) -> Self {
        Self::new(MessageKind::Command, payload)
    }

    // ========== Builder-style configuration ==========

    /// Set the delivery timeout, measured from creation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the earliest delivery delay, measured from creation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Set the callback invoked when the message resolves `Handled`
    pub fn on_handled(mut self, f: impl FnOnce(&Message) + Send + 'static) -> Self {
        self.callbacks.on_handled = Some(Box::new(f));
        self
    }

    /// Set the callback invoked when the message resolves `Processed`
    pub fn on_processed(mut self, f: impl FnOnce(&Message) + Send + 'static) -> Self {
        self.callbacks.on_processed = Some(Box::new(f));
        self
    }

    /// Set the callback invoked when the message resolves `Failed`
    pub fn on_failure(mut self, f: impl FnOnce(&Message) + Send + 'static) -> Self {
        self.callbacks.on_failure = Some(Box::new(f));
        self
    }

    /// Set the callback invoked when the message resolves `Cancelled`
    pub fn on_cancelled(mut self, f: impl FnOnce(&Message) + Send + 'static) -> Self {
        self.callbacks.on_cancelled = Some(Box::new(f));
        self
    }

    /// Set the callback invoked when the message resolves `TimedOut`
    pub fn on_timeout(mut self, f: impl FnOnce(&Message) + Send + 'static) -> Self {
        self.callbacks.on_timeout = Some(Box::new(f));
        self
    }

    // ========== Accessors ==========

    /// Get the unique message ID
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Get the delivery category
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Get the current delivery state
    pub fn state(&self) -> DeliveryState {
        self.state
    }

    /// Get a handle observing this message's outcome
    pub fn result(&self) -> MessageResult {
        self.result.clone()
    }

    /// Get the configured timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Get the configured delay, if any
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Time elapsed since the message was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Check whether the attached token, if any, has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    // ========== Payload access ==========

    /// Check the payload's runtime type
    pub fn payload_is<P: Any>(&self) -> bool {
        self.payload_type == TypeId::of::<P>()
    }

    /// Downcast the payload
    pub fn payload_ref<P: Any>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }

    /// Downcast the payload mutably
    pub fn payload_mut<P: Any>(&mut self) -> Option<&mut P> {
        self.payload.downcast_mut::<P>()
    }

    // ========== Handler-side resolution ==========

    /// Claim the message: state becomes `Handled`, result records success.
    ///
    /// Ignored if the message already reached a terminal state.
    pub fn mark_handled(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = DeliveryState::Handled;
        self.result.flag_success("handled");
    }

    /// Fail the message: state becomes `Failed`, result records the error.
    ///
    /// Ignored if the message already reached a terminal state.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = DeliveryState::Failed;
        self.result.flag_failure(message);
    }

    /// Coordinator-side terminal transition. First terminal state wins.
    pub(crate) fn set_state(&mut self, state: DeliveryState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        match state {
            DeliveryState::Handled => self.result.flag_success("handled"),
            DeliveryState::Processed => self.result.flag_success("processed"),
            DeliveryState::Failed => self.result.flag_failure("failed"),
            DeliveryState::Cancelled => self.result.flag_cancelled("cancelled"),
            DeliveryState::TimedOut => self.result.flag_timed_out("timed out"),
            DeliveryState::InProgress => {}
        }
    }

    /// Record a dispatch failure with an explicit result message.
    pub(crate) fn fail_with(&mut self, message: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = DeliveryState::Failed;
        self.result.flag_failure(message);
    }

    /// Take the completion callback matching the terminal state, if any.
    pub(crate) fn take_completion(&mut self) -> Option<CompletionFn> {
        match self.state {
            DeliveryState::Handled => self.callbacks.on_handled.take(),
            DeliveryState::Processed => self.callbacks.on_processed.take(),
            DeliveryState::Failed => self.callbacks.on_failure.take(),
            DeliveryState::Cancelled => self.callbacks.on_cancelled.take(),
            DeliveryState::TimedOut => self.callbacks.on_timeout.take(),
            DeliveryState::InProgress => None,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .field("delay", &self.delay)
            .finish()
    }
}
