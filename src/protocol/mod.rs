//! Wire protocol for status reports and user messages
//!
//! This module implements the report codec, topic naming and the
//! classification applied to received readings.

pub mod classify;
pub mod report;
pub mod topics;

pub use classify::*;
pub use report::*;
pub use topics::*;
