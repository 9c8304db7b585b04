mod events;
mod queue;

pub use events::{EventPayload, InboundEvent};
pub use queue::EventQueue;
