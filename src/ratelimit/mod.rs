//! Admission control for rate-limited submissions.
//!
//! A [`WindowGate`] bounds how many operations may start per window and a
//! [`Replenisher`] resets it at every window boundary.

mod gate;
mod replenisher;
mod window;

pub use gate::{GateError, GateSnapshot, ReleasePolicy, SlotPermit, WindowGate};
pub use replenisher::{Replenish, Replenisher};
pub use window::TimeWindow;
