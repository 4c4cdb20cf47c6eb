//! of-core: stable foundation for odeflow.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers + period reduction)
//! - timing (opt-in wall-clock timers)
//! - error (shared error types)

pub mod error;
pub mod numeric;
pub mod timing;

// Re-exports: nice ergonomics for downstream crates
pub use error::{OfError, OfResult};
pub use numeric::*;
