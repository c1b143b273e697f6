//! Commonly used imports for the core crate

pub use paperguard_types::prelude::*;
pub use paperguard_types::rate_adapter::RateStoreAdapter;

// vim: ts=4
