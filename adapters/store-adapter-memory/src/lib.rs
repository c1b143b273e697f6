//! In-process store adapter for Paperguard.
//!
//! Backs the shared-store contract with a plain in-memory map. Single
//! instance only — state is not shared across processes — which makes it
//! suitable for development setups and tests, not for horizontally scaled
//! deployments. Expiry is lazy: entries are dropped when touched past
//! their deadline, mirroring how TTL-expired keys simply stop being
//! visible.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use paperguard::prelude::*;
use paperguard::rate_adapter::RateStoreAdapter;

#[derive(Debug)]
struct Entry {
	value: String,
	expires_at: Option<Instant>,
}

impl Entry {
	fn expired(&self) -> bool {
		self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
	}
}

/// Memory-backed implementation of the store contract.
///
/// Counter mutations hold the map lock for their whole read-modify-write,
/// which is what makes `increment`/`decrement` atomic here.
#[derive(Debug, Default)]
pub struct RateAdapterMemory {
	entries: Mutex<HashMap<Box<str>, Entry>>,
}

impl RateAdapterMemory {
	pub fn new() -> Self {
		Self::default()
	}

	fn add(&self, key: &str, delta: i64) -> i64 {
		let mut entries = self.entries.lock();
		if entries.get(key).is_some_and(Entry::expired) {
			entries.remove(key);
		}

		let entry = entries
			.entry(key.into())
			.or_insert(Entry { value: "0".to_string(), expires_at: None });
		let value = entry.value.parse::<i64>().unwrap_or(0) + delta;
		entry.value = value.to_string();
		value
	}
}

#[async_trait]
impl RateStoreAdapter for RateAdapterMemory {
	async fn increment(&self, key: &str) -> ClResult<i64> {
		Ok(self.add(key, 1))
	}

	async fn decrement(&self, key: &str) -> ClResult<i64> {
		Ok(self.add(key, -1))
	}

	async fn expire(&self, key: &str, ttl_secs: u32) -> ClResult<bool> {
		let mut entries = self.entries.lock();
		if entries.get(key).is_some_and(Entry::expired) {
			entries.remove(key);
		}

		match entries.get_mut(key) {
			Some(entry) => {
				entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs.into()));
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn get(&self, key: &str) -> ClResult<Option<Box<str>>> {
		let mut entries = self.entries.lock();
		if entries.get(key).is_some_and(Entry::expired) {
			entries.remove(key);
		}
		Ok(entries.get(key).map(|entry| entry.value.clone().into_boxed_str()))
	}

	async fn set(&self, key: &str, value: &str, expire_secs: Option<u32>) -> ClResult<()> {
		let expires_at =
			expire_secs.map(|secs| Instant::now() + Duration::from_secs(secs.into()));
		self.entries
			.lock()
			.insert(key.into(), Entry { value: value.to_string(), expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> ClResult<()> {
		self.entries.lock().remove(key);
		Ok(())
	}

	async fn delete_many(&self, keys: &[Box<str>]) -> ClResult<()> {
		let mut entries = self.entries.lock();
		for key in keys {
			entries.remove(key.as_ref());
		}
		Ok(())
	}
}


// vim: ts=4
