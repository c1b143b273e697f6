//! Adapter trait for the shared rate limiting store.
//!
//! The service itself is stateless per process: window counters, abuse
//! metrics and abuse status all live in a shared external key-value store
//! so any number of instances can run behind a load balancer without
//! in-process coordination. This trait is the narrow contract every store
//! backend has to implement.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::prelude::*;

/// A Paperguard store adapter
///
/// Implementations must make `increment` and `decrement` atomic with
/// respect to concurrent callers targeting the same key — a naive
/// read-modify-write sequence loses updates and must not be used.
#[async_trait]
pub trait RateStoreAdapter: Debug + Send + Sync {
	/// Atomically increments the counter stored at `key` and returns the
	/// new value. A missing key counts from zero.
	async fn increment(&self, key: &str) -> ClResult<i64>;

	/// Atomically decrements the counter stored at `key` and returns the
	/// new value. A missing key counts from zero.
	async fn decrement(&self, key: &str) -> ClResult<i64>;

	/// Sets the time-to-live of `key`. Returns false if the key does not exist.
	async fn expire(&self, key: &str, ttl_secs: u32) -> ClResult<bool>;

	/// Reads the raw value stored at `key`.
	async fn get(&self, key: &str) -> ClResult<Option<Box<str>>>;

	/// Writes `value` at `key`, optionally with a time-to-live.
	async fn set(&self, key: &str, value: &str, expire_secs: Option<u32>) -> ClResult<()>;

	/// Deletes `key`. Deleting a missing key is not an error.
	async fn delete(&self, key: &str) -> ClResult<()>;

	/// Deletes several keys in one batch (administrative cleanup).
	async fn delete_many(&self, keys: &[Box<str>]) -> ClResult<()>;
}

// vim: ts=4
