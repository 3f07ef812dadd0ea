//! # kiln_message - Kiln Engine Message Bus
//!
//! In-process message/event bus letting independently compiled modules
//! (renderer backends, windowing backends, loggers, input handlers) talk to
//! each other without compile-time coupling:
//! - Typed-but-erased payloads with runtime downcasts
//! - Synchronous `send` and deferred `post`/`process` delivery
//! - Cancellation, timeouts, and shared outcome results
//! - Thread-local "current dispatcher" scoping
//!
//! ## Delivery model
//!
//! ```text
//! sender ──send()──► MessageCoordinator ──► handler 1 ──► handler 2 ──► ...
//!        ──post()──► pending queue ──process()──► same handler chain
//! ```
//!
//! A single logical engine thread drives `process()` each tick. `send` may be
//! called from any thread; the handler list is snapshotted per delivery.
//! Commands stop at the first handler that claims them, events fan out to
//! every subscriber.
//!
//! ## Example
//!
//! ```
//! use kiln_message::{Message, MessageCoordinator};
//!
//! struct WindowResized { width: u32, height: u32 }
//!
//! let coordinator = MessageCoordinator::new();
//! coordinator.add_handler_fn(|message| {
//!     if let Some(resized) = message.payload_ref::<WindowResized>() {
//!         assert_eq!((resized.width, resized.height), (1280, 720));
//!     }
//!     if message.payload_is::<WindowResized>() {
//!         message.mark_handled();
//!     }
//! });
//!
//! let mut message = Message::event(WindowResized { width: 1280, height: 720 });
//! let result = coordinator.send(&mut message);
//! assert!(result.succeeded());
//! ```

pub mod cancel;
pub mod context;
pub mod coordinator;
pub mod id;
pub mod message;
pub mod result;

pub use cancel::{CancellationSource, CancellationToken};
pub use context::{current_dispatcher, set_current_dispatcher, DispatcherScope};
pub use coordinator::{HandlerId, MessageCoordinator, MessageHandler};
pub use id::MessageId;
pub use message::{DeliveryState, Message, MessageKind};
pub use result::{MessageResult, ResultStatus};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cancel::{CancellationSource, CancellationToken};
    pub use crate::context::{current_dispatcher, DispatcherScope};
    pub use crate::coordinator::{HandlerId, MessageCoordinator, MessageHandler};
    pub use crate::id::MessageId;
    pub use crate::message::{DeliveryState, Message, MessageKind};
    pub use crate::result::{MessageResult, ResultStatus};
}
