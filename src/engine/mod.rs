//! Engine lifecycle shared by sources and sinks
//!
//! Both engines move through `Uninitialized -> Initialized -> Started` and
//! run exactly one worker task while started. The worker owns the sockets it
//! polls and hands them back when it exits, so stop/start cycles reuse them.

pub mod state;

pub use state::{advance_tick, poll_timeout, EnginePhase, Lifecycle};
