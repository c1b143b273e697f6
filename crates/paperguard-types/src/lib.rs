//! Shared types, adapter traits, and error types for the Paperguard
//! admission-control service.
//!
//! This crate contains the foundational types shared between the core
//! service crate and all store adapter implementations. Extracting these
//! into a separate crate lets adapter crates compile in parallel with the
//! service itself.

#![forbid(unsafe_code)]

pub mod error;
pub mod prelude;
pub mod rate_adapter;
pub mod types;

// vim: ts=4
