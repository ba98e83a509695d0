//! Ledger events and the pub/sub plumbing that carries them to consumers.
//!
//! Events are persisted first (outbox) and published afterwards, so nothing here
//! is a source of truth.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
