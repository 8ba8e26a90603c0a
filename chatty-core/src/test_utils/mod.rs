//! Test utilities for chatty
//!
//! Seeded entropy, timeouts around board subscriptions and simulated devices.

pub mod async_helpers;
pub mod entropy;
pub mod fixtures;

pub use async_helpers::*;
pub use entropy::*;
pub use fixtures::*;
