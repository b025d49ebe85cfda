//! syncspace-events - in-process filtered pub/sub
//!
//! Producers emit typed events; subscribers receive the subset matching
//! their filter over a bounded channel. Delivery is fire-and-forget: a full
//! subscriber buffer drops the event for that subscriber only, and emission
//! never fails the producer.

mod bus;
mod event;

pub use bus::{EventBus, EventBusError, BUFFER_SIZE};
pub use event::{Event, EventFilter, EventType, UnknownEventType};
