//! Drivers that connect a [`SessionRuntime`](super::SessionRuntime) to a
//! real device.

pub mod terminal;
