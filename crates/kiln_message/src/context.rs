//! Thread-local "current dispatcher" context
//!
//! Lets deeply nested code reach the active coordinator without threading a
//! reference through every call site. The pointer is scoped per call stack via
//! [`DispatcherScope`] and per thread: a new thread starts with no dispatcher
//! and must establish its own.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::coordinator::MessageCoordinator;

thread_local! {
    static CURRENT_DISPATCHER: RefCell<Option<Arc<MessageCoordinator>>> = RefCell::new(None);
}

/// Get the active coordinator for this thread, if one is set
pub fn current_dispatcher() -> Option<Arc<MessageCoordinator>> {
    CURRENT_DISPATCHER.with(|current| current.borrow().clone())
}

/// Replace the active coordinator for this thread, returning the previous one.
///
/// Prefer [`DispatcherScope`] for stack-like establish/restore.
pub fn set_current_dispatcher(
    dispatcher: Option<Arc<MessageCoordinator>>,
) -> Option<Arc<MessageCoordinator>> {
    CURRENT_DISPATCHER.with(|current| current.replace(dispatcher))
}

/// RAII guard establishing a coordinator as the thread's current dispatcher.
///
/// Saves the previous value on construction and restores it on drop, so
/// scopes nest like a stack. The guard is not `Send`; it must be dropped on
/// the thread that created it.
pub struct DispatcherScope {
    previous: Option<Arc<MessageCoordinator>>,
    _not_send: PhantomData<*const ()>,
}

impl DispatcherScope {
    /// Establish `dispatcher` as current until the guard drops
    pub fn enter(dispatcher: Arc<MessageCoordinator>) -> Self {
        Self {
            previous: set_current_dispatcher(Some(dispatcher)),
            _not_send: PhantomData,
        }
    }
}

impl Drop for DispatcherScope {
    fn drop(&mut self) {
        set_current_dispatcher(self.previous.take());
    }
}
