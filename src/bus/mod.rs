//! Synchronous publish/subscribe bus with one-shot and expiring handlers.
//!
//! The bus is an explicit value owned by the flow controller. Handlers get
//! the session state, the bus itself (so they can register follow-up
//! handlers or emit nested events) and the payload.

mod core;
mod events;

pub use core::{EventBus, Handler, HandlerId};
pub use events::{EventPayload, ExperimentEvent};
