//! Addressable handles: cloneable senders to the mailbox of a queue manager,
//! a coordinator, or a sink. Calling a method on a handle sends a message and
//! (for request/response operations) awaits a one-shot reply — the mapping
//! spec.md §9 suggests for "addressable processes" without a language-level
//! process primitive.

mod coordinator;
mod queue_manager;
mod sink;

pub use coordinator::{CoordinatorHandle, CoordinatorMsg};
pub use queue_manager::{QueueManagerHandle, QueueManagerMsg};
pub use sink::SinkHandle;
