//! Testing utilities and mock implementations
//!
//! Test doubles for exercising sessions without an MQTT broker or a GPS
//! daemon.

pub mod mocks;

pub use mocks::*;
