//! Message coordinator: subscriber registry plus synchronous and deferred delivery

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::message::{DeliveryState, Message, MessageKind};
use crate::result::MessageResult;

/// Token returned by [`MessageCoordinator::add_handler`] for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// A registered message handler.
///
/// Handlers receive every message sent or drained through the coordinator and
/// may inspect the payload's runtime type, act, and resolve the message via
/// [`Message::mark_handled`] / [`Message::mark_failed`].
pub trait MessageHandler: Send + Sync {
    /// Handle a message
    fn handle(&self, message: &mut Message);
}

#[derive(Clone)]
struct HandlerEntry {
    id: HandlerId,
    handler: Arc<dyn MessageHandler>,
}

/// Routes messages from senders to registered handlers.
///
/// Handlers are invoked in subscription order for both synchronous `send` and
/// drained `post` messages. The handler list is snapshotted per delivery, so
/// subscribe/unsubscribe from other threads (or from inside a handler) never
/// disturbs an in-flight delivery.
pub struct MessageCoordinator {
    handlers: Mutex<Vec<HandlerEntry>>,
    pending: Mutex<Vec<Message>>,
    next_handler_id: AtomicU64,
}

impl MessageCoordinator {
    /// Create a coordinator with no handlers and an empty queue
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            next_handler_id: AtomicU64::new(1),
        }
    }

    // ========== Subscription ==========

    /// Register a handler. Returns a token for later removal. Never fails.
    pub fn add_handler(&self, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push(HandlerEntry { id, handler });
        id
    }

    /// Register a closure handler
    pub fn add_handler_fn<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&mut Message) + Send + Sync + 'static,
    {
        struct ClosureHandler<F>(F);

        impl<F> MessageHandler for ClosureHandler<F>
        where
            F: Fn(&mut Message) + Send + Sync,
        {
            fn handle(&self, message: &mut Message) {
                (self.0)(message)
            }
        }

        self.add_handler(Arc::new(ClosureHandler(f)))
    }

    /// Remove a handler. No-op if the token is unknown.
    ///
    /// A delivery already in flight keeps its snapshot; the handler is only
    /// excluded from future deliveries.
    pub fn remove_handler(&self, id: HandlerId) {
        self.handlers.lock().retain(|entry| entry.id != id);
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Remove all handlers. The pending queue is left alone.
    pub fn clear(&self) {
        let removed = {
            let mut handlers = self.handlers.lock();
            let removed = handlers.len();
            handlers.clear();
            removed
        };
        log::debug!("Cleared {} message handler(s)", removed);
    }

    // ========== Delivery ==========

    /// Deliver a message synchronously to the registered handlers.
    ///
    /// Handlers run in subscription order. A `Command` stops at the first
    /// handler that moves it out of `InProgress`; an `Event` fans out to all.
    /// Cancellation observed between handlers skips the remainder. The message
    /// always leaves in a terminal state; the final result is returned.
    pub fn send(&self, message: &mut Message) -> MessageResult {
        debug_assert!(
            !message.state().is_terminal(),
            "message {} was already resolved before send",
            message.id()
        );
        if !self.resolve_expired(message) {
            self.deliver(message);
        }
        message.result()
    }

    /// Queue a message for delivery during the next [`process`] call.
    ///
    /// Takes ownership; observe the outcome through a [`Message::result`]
    /// handle cloned before posting. Returns immediately, no handler runs.
    ///
    /// [`process`]: MessageCoordinator::process
    pub fn post(&self, message: Message) {
        self.pending.lock().push(message);
    }

    /// Drain the pending queue, delivering each message in post order.
    ///
    /// Messages posted by handlers during the drain land in the next batch;
    /// they are not re-drained in the same pass. Cancelled and timed-out
    /// messages resolve without delivery; a message whose delay has not yet
    /// elapsed stays queued. Returns the number of messages delivered.
    pub fn process(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut deferred: Vec<Message> = Vec::new();
        for mut message in batch {
            if self.resolve_expired(&mut message) {
                continue;
            }
            if let Some(delay) = message.delay() {
                if message.age() < delay {
                    deferred.push(message);
                    continue;
                }
            }
            self.deliver(&mut message);
            delivered += 1;
        }

        // Delayed messages rejoin the queue ahead of anything posted mid-drain
        if !deferred.is_empty() {
            let mut pending = self.pending.lock();
            deferred.append(&mut pending);
            *pending = deferred;
        }

        delivered
    }

    /// Number of messages waiting for the next `process` call
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Resolve a cancelled or timed-out message without delivery.
    ///
    /// Returns true if the message reached a terminal state here.
    fn resolve_expired(&self, message: &mut Message) -> bool {
        if message.is_cancelled() {
            message.set_state(DeliveryState::Cancelled);
            self.complete(message);
            return true;
        }
        if let Some(timeout) = message.timeout() {
            if message.age() >= timeout {
                message.set_state(DeliveryState::TimedOut);
                self.complete(message);
                return true;
            }
        }
        false
    }

    fn deliver(&self, message: &mut Message) {
        let entries: Vec<HandlerEntry> = self.handlers.lock().clone();

        for entry in &entries {
            if message.is_cancelled() {
                break;
            }
            let keep_delivering = match message.state() {
                DeliveryState::InProgress => true,
                // Handled events keep fanning out; handled commands are done
                DeliveryState::Handled => message.kind() == MessageKind::Event,
                _ => false,
            };
            if !keep_delivering {
                break;
            }
            entry.handler.handle(message);
        }

        if !message.state().is_terminal() {
            if message.is_cancelled() {
                message.set_state(DeliveryState::Cancelled);
            } else if message.kind() == MessageKind::Command {
                log::debug!("Command {} found no handler", message.id());
                message.fail_with("no handler claimed the command");
            } else {
                message.set_state(DeliveryState::Processed);
            }
        }

        self.complete(message);
    }

    fn complete(&self, message: &mut Message) {
        if let Some(callback) = message.take_completion() {
            callback(&*message);
        }
    }
}

impl Default for MessageCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCoordinator")
            .field("handlers", &self.handler_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationSource;
    use crate::result::ResultStatus;
    use parking_lot::Mutex as PlMutex;
    use std::time::Duration;

    struct Footstep;
    struct Jump;

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let coordinator = MessageCoordinator::new();
        let order = Arc::new(PlMutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            coordinator.add_handler_fn(move |_| order.lock().push(tag));
        }

        coordinator.send(&mut Message::event(Footstep));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_event_fans_out_past_handled() {
        let coordinator = MessageCoordinator::new();
        let count = Arc::new(PlMutex::new(0u32));

        for _ in 0..3 {
            let count = count.clone();
            coordinator.add_handler_fn(move |message| {
                *count.lock() += 1;
                message.mark_handled();
            });
        }

        let mut message = Message::event(Footstep);
        coordinator.send(&mut message);

        assert_eq!(*count.lock(), 3);
        assert_eq!(message.state(), DeliveryState::Handled);
    }

    #[test]
    fn test_command_stops_at_first_claim() {
        let coordinator = MessageCoordinator::new();
        let count = Arc::new(PlMutex::new(0u32));

        for _ in 0..3 {
            let count = count.clone();
            coordinator.add_handler_fn(move |message| {
                *count.lock() += 1;
                message.mark_handled();
            });
        }

        let mut message = Message::command(Jump);
        let result = coordinator.send(&mut message);

        assert_eq!(*count.lock(), 1);
        assert_eq!(message.state(), DeliveryState::Handled);
        assert!(result.succeeded());
    }

    #[test]
    fn test_unclaimed_command_fails() {
        let coordinator = MessageCoordinator::new();
        coordinator.add_handler_fn(|_| {});

        let mut message = Message::command(Jump);
        let result = coordinator.send(&mut message);

        assert_eq!(message.state(), DeliveryState::Failed);
        assert_eq!(result.status(), ResultStatus::Failed);
        assert!(!result.succeeded());
    }

    #[test]
    fn test_unclaimed_event_is_processed() {
        let coordinator = MessageCoordinator::new();
        coordinator.add_handler_fn(|_| {});

        let mut message = Message::event(Footstep);
        let result = coordinator.send(&mut message);

        assert_eq!(message.state(), DeliveryState::Processed);
        assert!(result.succeeded());
    }

    #[test]
    fn test_remove_mid_delivery_keeps_current_snapshot() {
        let coordinator = Arc::new(MessageCoordinator::new());
        let hits = Arc::new(PlMutex::new(0u32));

        // Registered below; the first handler removes it during delivery.
        let victim_id = Arc::new(PlMutex::new(None::<HandlerId>));

        {
            let coordinator = coordinator.clone();
            let victim_id = victim_id.clone();
            coordinator.clone().add_handler_fn(move |_| {
                if let Some(id) = *victim_id.lock() {
                    coordinator.remove_handler(id);
                }
            });
        }
        {
            let hits = hits.clone();
            let id = coordinator.add_handler_fn(move |_| *hits.lock() += 1);
            *victim_id.lock() = Some(id);
        }

        // Current delivery still reaches the removed handler
        coordinator.send(&mut Message::event(Footstep));
        assert_eq!(*hits.lock(), 1);

        // Future deliveries exclude it
        coordinator.send(&mut Message::event(Footstep));
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_post_defers_until_process() {
        let coordinator = MessageCoordinator::new();
        let hits = Arc::new(PlMutex::new(0u32));
        {
            let hits = hits.clone();
            coordinator.add_handler_fn(move |_| *hits.lock() += 1);
        }

        coordinator.post(Message::event(Footstep));
        assert_eq!(*hits.lock(), 0);
        assert_eq!(coordinator.pending_count(), 1);

        assert_eq!(coordinator.process(), 1);
        assert_eq!(*hits.lock(), 1);

        // Nothing left for a second pass
        assert_eq!(coordinator.process(), 0);
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_messages_posted_mid_drain_wait_for_next_pass() {
        let coordinator = Arc::new(MessageCoordinator::new());
        let hits = Arc::new(PlMutex::new(0u32));
        {
            let coordinator_inner = coordinator.clone();
            let hits = hits.clone();
            coordinator.add_handler_fn(move |message| {
                *hits.lock() += 1;
                if message.payload_is::<Footstep>() {
                    coordinator_inner.post(Message::event(Jump));
                }
            });
        }

        coordinator.post(Message::event(Footstep));
        assert_eq!(coordinator.process(), 1);
        assert_eq!(*hits.lock(), 1);
        assert_eq!(coordinator.pending_count(), 1);

        assert_eq!(coordinator.process(), 1);
        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn test_cancelled_message_skips_delivery() {
        let coordinator = MessageCoordinator::new();
        let hits = Arc::new(PlMutex::new(0u32));
        {
            let hits = hits.clone();
            coordinator.add_handler_fn(move |_| *hits.lock() += 1);
        }

        let source = CancellationSource::new();
        let cancelled = Arc::new(PlMutex::new(false));
        let cancelled_flag = cancelled.clone();
        let message = Message::event(Footstep)
            .with_cancellation(source.token())
            .on_cancelled(move |_| *cancelled_flag.lock() = true);
        let result = message.result();

        coordinator.post(message);
        source.cancel();
        assert_eq!(coordinator.process(), 0);

        assert_eq!(*hits.lock(), 0);
        assert!(*cancelled.lock());
        assert_eq!(result.status(), ResultStatus::Cancelled);
    }

    #[test]
    fn test_cancellation_mid_delivery_skips_remaining_handlers() {
        let coordinator = MessageCoordinator::new();
        let source = Arc::new(CancellationSource::new());
        let hits = Arc::new(PlMutex::new(0u32));

        {
            let source = source.clone();
            coordinator.add_handler_fn(move |_| source.cancel());
        }
        {
            let hits = hits.clone();
            coordinator.add_handler_fn(move |_| *hits.lock() += 1);
        }

        let mut message = Message::event(Footstep).with_cancellation(source.token());
        let result = coordinator.send(&mut message);

        assert_eq!(*hits.lock(), 0);
        assert_eq!(message.state(), DeliveryState::Cancelled);
        assert_eq!(result.status(), ResultStatus::Cancelled);
    }

    #[test]
    fn test_zero_timeout_expires_on_drain() {
        let coordinator = MessageCoordinator::new();
        let handled = Arc::new(PlMutex::new(false));
        let timed_out = Arc::new(PlMutex::new(0u32));
        {
            let handled = handled.clone();
            coordinator.add_handler_fn(move |message| {
                *handled.lock() = true;
                message.mark_handled();
            });
        }

        let timed_out_count = timed_out.clone();
        let message = Message::command(Jump)
            .with_timeout(Duration::ZERO)
            .on_timeout(move |_| *timed_out_count.lock() += 1);
        let result = message.result();

        coordinator.post(message);
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(coordinator.process(), 0);

        assert!(!*handled.lock());
        assert_eq!(*timed_out.lock(), 1);
        assert_eq!(result.status(), ResultStatus::TimedOut);
    }

    #[test]
    fn test_delayed_message_waits_in_queue() {
        let coordinator = MessageCoordinator::new();
        let hits = Arc::new(PlMutex::new(0u32));
        {
            let hits = hits.clone();
            coordinator.add_handler_fn(move |_| *hits.lock() += 1);
        }

        coordinator.post(Message::event(Footstep).with_delay(Duration::from_millis(20)));
        assert_eq!(coordinator.process(), 0);
        assert_eq!(*hits.lock(), 0);
        assert_eq!(coordinator.pending_count(), 1);

        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(coordinator.process(), 1);
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_clear_removes_handlers_but_keeps_queue() {
        let coordinator = MessageCoordinator::new();
        coordinator.add_handler_fn(|_| {});
        coordinator.add_handler_fn(|_| {});
        coordinator.post(Message::event(Footstep));

        coordinator.clear();
        assert_eq!(coordinator.handler_count(), 0);
        assert_eq!(coordinator.pending_count(), 1);
    }
}
