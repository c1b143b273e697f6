//! Redis store adapter for Paperguard.
//!
//! Backs the shared-store contract with Redis so admission state is shared
//! across application instances. Uses `redis::aio::ConnectionManager` for
//! automatic reconnection; every Redis failure surfaces as
//! `Error::ServiceUnavailable` and the service layer decides whether to
//! degrade open or closed.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use paperguard::prelude::*;
use paperguard::rate_adapter::RateStoreAdapter;

/// Redis-backed implementation of the store contract.
///
/// Counter mutations map to `INCR`/`DECR`, which are atomic on the server,
/// so concurrent instances never lose updates. All keys are namespaced
/// under a configurable prefix.
pub struct RateAdapterRedis {
	manager: ConnectionManager,
	prefix: Box<str>,
}

impl std::fmt::Debug for RateAdapterRedis {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RateAdapterRedis").field("prefix", &self.prefix).finish_non_exhaustive()
	}
}

fn map_err(err: redis::RedisError) -> Error {
	Error::ServiceUnavailable(format!("redis: {}", err))
}

impl RateAdapterRedis {
	/// Connects to Redis with the default `pg:` key prefix.
	pub async fn connect(url: &str) -> ClResult<Self> {
		Self::connect_with_prefix(url, "pg:").await
	}

	pub async fn connect_with_prefix(url: &str, prefix: &str) -> ClResult<Self> {
		let client = Client::open(url)
			.map_err(|e| Error::ConfigError(format!("invalid redis url: {}", e)))?;
		let manager = ConnectionManager::new(client).await.map_err(map_err)?;
		tracing::info!(prefix, "connected to redis store");
		Ok(Self { manager, prefix: prefix.into() })
	}

	fn key(&self, key: &str) -> String {
		format!("{}{}", self.prefix, key)
	}
}

#[async_trait]
impl RateStoreAdapter for RateAdapterRedis {
	async fn increment(&self, key: &str) -> ClResult<i64> {
		let mut conn = self.manager.clone();
		conn.incr(self.key(key), 1).await.map_err(map_err)
	}

	async fn decrement(&self, key: &str) -> ClResult<i64> {
		let mut conn = self.manager.clone();
		conn.decr(self.key(key), 1).await.map_err(map_err)
	}

	async fn expire(&self, key: &str, ttl_secs: u32) -> ClResult<bool> {
		let mut conn = self.manager.clone();
		conn.expire(self.key(key), ttl_secs.into()).await.map_err(map_err)
	}

	async fn get(&self, key: &str) -> ClResult<Option<Box<str>>> {
		let mut conn = self.manager.clone();
		let value: Option<String> = conn.get(self.key(key)).await.map_err(map_err)?;
		Ok(value.map(String::into_boxed_str))
	}

	async fn set(&self, key: &str, value: &str, expire_secs: Option<u32>) -> ClResult<()> {
		let mut conn = self.manager.clone();
		match expire_secs {
			Some(secs) => conn.set_ex(self.key(key), value, secs.into()).await.map_err(map_err),
			None => conn.set(self.key(key), value).await.map_err(map_err),
		}
	}

	async fn delete(&self, key: &str) -> ClResult<()> {
		let mut conn = self.manager.clone();
		conn.del(self.key(key)).await.map_err(map_err)
	}

	async fn delete_many(&self, keys: &[Box<str>]) -> ClResult<()> {
		if keys.is_empty() {
			return Ok(());
		}
		let mut conn = self.manager.clone();
		let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
		conn.del(keys).await.map_err(map_err)
	}
}


// vim: ts=4
