//! Integration test helpers and utilities
//!
//! This module provides the test infrastructure for integration testing:
//! - Scripted mock listeners with configurable accept/close behaviour
//! - Randomised listeners for stress scenarios
//! - Scenario modules exercising the bundle end to end

pub mod scenarios;

// Re-export commonly used helpers
pub use helpers::{
    mock_listener::{MockListener, MockListenerBuilder, Step},
    random_listener::RandomListener,
};
