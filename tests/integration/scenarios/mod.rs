//! Test scenarios for integration testing
//!
//! Each module contains tests for specific functionality:
//! - lifecycle: error classification and exhaustion bookkeeping
//! - faults: panics and close failures
//! - sockets: real TCP and Unix listeners
//! - stress: many randomised listeners

pub mod sockets;
pub mod stress;
