//! Provider implementations.
//!
//! Each backend is gated behind a feature flag.

#[cfg(feature = "simulator")]
pub mod simulated;
