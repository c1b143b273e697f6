//! Fixed-Window Counters
//!
//! Time-windowed admission counters over the shared store. Each (policy,
//! digest) pair maps to one counter per fixed window; counters are created
//! by the first increment within a window and destroyed purely by TTL
//! expiry, never by explicit signal.
//!
//! Known property of the fixed-window algorithm: a burst straddling a
//! window boundary can admit up to roughly twice the ceiling in a short
//! span. A sliding window would close that gap but changes observable
//! behavior, so it is not used here.

use std::sync::Arc;

use crate::policy::RatePolicy;
use crate::prelude::*;

/// Result of one windowed increment.
#[derive(Debug, Clone, Copy)]
pub struct WindowCount {
	/// Counter value after the increment
	pub count: i64,
	/// Window length of the policy, milliseconds
	pub window_ms: i64,
	/// Start of the next window
	pub reset_at: Timestamp,
}

/// Fixed-window counter store over a shared store adapter.
#[derive(Debug, Clone)]
pub struct WindowCounterStore {
	store: Arc<dyn RateStoreAdapter>,
}

impl WindowCounterStore {
	pub fn new(store: Arc<dyn RateStoreAdapter>) -> Self {
		Self { store }
	}

	fn window_index(policy: &RatePolicy, now: Timestamp) -> i64 {
		now.0 / policy.window_ms
	}

	fn window_key(policy: &RatePolicy, digest: &str, index: i64) -> String {
		format!("rl:{}:{}:{}", policy.name, digest, index)
	}

	fn window_ttl_secs(policy: &RatePolicy) -> u32 {
		((policy.window_ms + 999) / 1000).max(1) as u32
	}

	/// Start of the window following the one containing `now`.
	pub fn reset_at(policy: &RatePolicy, now: Timestamp) -> Timestamp {
		Timestamp((Self::window_index(policy, now) + 1) * policy.window_ms)
	}

	/// Storage key of the current window for a digest (administrative use).
	pub fn current_key(policy: &RatePolicy, digest: &str, now: Timestamp) -> Box<str> {
		Self::window_key(policy, digest, Self::window_index(policy, now)).into_boxed_str()
	}

	/// Atomically increments the current window counter.
	///
	/// The first increment of a window (count == 1) also sets the key's
	/// expiry to the window length, in the same logical sequence, so a
	/// counter can never outlive its window.
	pub async fn increment(
		&self,
		policy: &RatePolicy,
		digest: &str,
		now: Timestamp,
	) -> ClResult<WindowCount> {
		let index = Self::window_index(policy, now);
		let key = Self::window_key(policy, digest, index);

		let count = self.store.increment(&key).await?;
		if count == 1 {
			self.store.expire(&key, Self::window_ttl_secs(policy)).await?;
		}

		Ok(WindowCount {
			count,
			window_ms: policy.window_ms,
			reset_at: Timestamp((index + 1) * policy.window_ms),
		})
	}

	/// Removes one request from the current window counter.
	///
	/// Used for outcome adjustment when a policy skips successful or failed
	/// requests. A counter never goes below zero; if a decrement races past
	/// zero the key is dropped instead.
	pub async fn uncount(&self, policy: &RatePolicy, digest: &str, now: Timestamp) -> ClResult<()> {
		let key = Self::window_key(policy, digest, Self::window_index(policy, now));
		let value = self.store.decrement(&key).await?;
		if value < 0 {
			self.store.delete(&key).await?;
		}
		Ok(())
	}

	/// Reads the current window counter without incrementing it.
	pub async fn count(&self, policy: &RatePolicy, digest: &str, now: Timestamp) -> ClResult<i64> {
		let key = Self::window_key(policy, digest, Self::window_index(policy, now));
		let raw = self.store.get(&key).await?;
		Ok(raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
	}

	/// Deletes the current window counter (administrative reset).
	pub async fn clear(&self, policy: &RatePolicy, digest: &str, now: Timestamp) -> ClResult<()> {
		let key = Self::window_key(policy, digest, Self::window_index(policy, now));
		self.store.delete(&key).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use paperguard_store_adapter_memory::RateAdapterMemory;

	fn test_policy(window_ms: i64, max_requests: u32) -> RatePolicy {
		RatePolicy {
			name: "TEST".into(),
			window_ms,
			max_requests,
			skip_successful: false,
			skip_failed: false,
		}
	}

	#[test]
	fn test_window_index_math() {
		let policy = test_policy(900_000, 10);
		assert_eq!(WindowCounterStore::window_index(&policy, Timestamp(0)), 0);
		assert_eq!(WindowCounterStore::window_index(&policy, Timestamp(899_999)), 0);
		assert_eq!(WindowCounterStore::window_index(&policy, Timestamp(900_000)), 1);
		assert_eq!(
			WindowCounterStore::reset_at(&policy, Timestamp(450_000)),
			Timestamp(900_000)
		);
	}

	#[test]
	fn test_window_ttl_rounds_up() {
		assert_eq!(WindowCounterStore::window_ttl_secs(&test_policy(900_000, 10)), 900);
		assert_eq!(WindowCounterStore::window_ttl_secs(&test_policy(1500, 10)), 2);
		assert_eq!(WindowCounterStore::window_ttl_secs(&test_policy(1, 10)), 1);
	}

	#[tokio::test]
	async fn test_increment_counts_per_window() {
		let store = Arc::new(RateAdapterMemory::new());
		let windows = WindowCounterStore::new(store);
		let policy = test_policy(900_000, 10);
		let now = Timestamp::now();

		for expected in 1..=5 {
			let w = windows.increment(&policy, "digest-a", now).await.unwrap();
			assert_eq!(w.count, expected);
		}

		// A different digest keeps its own counter
		let w = windows.increment(&policy, "digest-b", now).await.unwrap();
		assert_eq!(w.count, 1);
	}

	#[tokio::test]
	async fn test_new_window_starts_fresh() {
		let store = Arc::new(RateAdapterMemory::new());
		let windows = WindowCounterStore::new(store);
		let policy = test_policy(1000, 10);

		let in_window = Timestamp(500);
		let next_window = Timestamp(1500);

		let w = windows.increment(&policy, "digest", in_window).await.unwrap();
		assert_eq!(w.count, 1);
		let w = windows.increment(&policy, "digest", in_window).await.unwrap();
		assert_eq!(w.count, 2);

		let w = windows.increment(&policy, "digest", next_window).await.unwrap();
		assert_eq!(w.count, 1);
		assert_eq!(w.reset_at, Timestamp(2000));
	}

	#[tokio::test]
	async fn test_concurrent_increments_lose_no_updates() {
		let store = Arc::new(RateAdapterMemory::new());
		let windows = Arc::new(WindowCounterStore::new(store));
		let policy = Arc::new(test_policy(900_000, 100));
		let now = Timestamp::now();

		let mut handles = Vec::new();
		for _ in 0..50 {
			let windows = windows.clone();
			let policy = policy.clone();
			handles.push(tokio::spawn(async move {
				windows.increment(&policy, "digest", now).await.unwrap();
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}

		let count = windows.count(&policy, "digest", now).await.unwrap();
		assert_eq!(count, 50);
	}

	#[tokio::test]
	async fn test_uncount_never_goes_negative() {
		let store = Arc::new(RateAdapterMemory::new());
		let windows = WindowCounterStore::new(store);
		let policy = test_policy(900_000, 10);
		let now = Timestamp::now();

		windows.increment(&policy, "digest", now).await.unwrap();
		windows.uncount(&policy, "digest", now).await.unwrap();
		assert_eq!(windows.count(&policy, "digest", now).await.unwrap(), 0);

		// Decrement of an empty window drops the key instead of going negative
		windows.uncount(&policy, "digest", now).await.unwrap();
		assert_eq!(windows.count(&policy, "digest", now).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_clear_resets_current_window() {
		let store = Arc::new(RateAdapterMemory::new());
		let windows = WindowCounterStore::new(store);
		let policy = test_policy(900_000, 10);
		let now = Timestamp::now();

		for _ in 0..7 {
			windows.increment(&policy, "digest", now).await.unwrap();
		}
		windows.clear(&policy, "digest", now).await.unwrap();

		let w = windows.increment(&policy, "digest", now).await.unwrap();
		assert_eq!(w.count, 1);
	}
}

// vim: ts=4
