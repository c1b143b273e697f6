//! Commonly used imports for the workspace

pub use crate::error::{ClResult, Error};
pub use crate::types::{ApiResponse, Timestamp};

// vim: ts=4
