//! Shared domain types, configuration, clock and store interfaces for the
//! agency scheduling engine.

pub mod clock;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{AgencyError, Result};
pub use store::{AlertKey, Store};
