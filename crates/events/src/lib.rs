//! Ledger event plumbing: the `Event` contract, envelopes, and a pub/sub bus.
//!
//! The accounting engine emits one event per committed mutation. Hosts publish
//! those on a bus so sync peers can mirror them, and feed remote envelopes back
//! through the same validation path as local writes.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
