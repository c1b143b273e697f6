//! Abuse Metrics Tracking
//!
//! Per-digest behavioral counters accumulated in the shared store as a
//! serialized blob with a fixed retention TTL. A blob that fails to decode
//! is silently treated as "start fresh" — corruption recovery is an
//! explicit decode-or-default operation, never an error surfaced to the
//! caller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::prelude::*;

/// Retention of behavioral metrics after the last request
pub const METRICS_TTL_SECS: u32 = 3600;

/// Behavioral counters for one digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbuseMetrics {
	pub request_count: u64,
	pub error_count: u64,
	pub upload_size_bytes: u64,
	pub first_request_at: Timestamp,
	pub last_request_at: Timestamp,
}

impl AbuseMetrics {
	/// Fresh metrics for a digest first seen at `now`.
	pub fn fresh(now: Timestamp) -> Self {
		Self {
			request_count: 0,
			error_count: 0,
			upload_size_bytes: 0,
			first_request_at: now,
			last_request_at: now,
		}
	}

	/// Fraction of requests that failed. Zero while no requests are recorded.
	pub fn error_rate(&self) -> f64 {
		if self.request_count == 0 {
			0.0
		} else {
			self.error_count as f64 / self.request_count as f64
		}
	}
}

/// Accumulates per-digest behavioral metrics in the shared store.
#[derive(Debug, Clone)]
pub struct AbuseMetricsTracker {
	store: Arc<dyn RateStoreAdapter>,
}

impl AbuseMetricsTracker {
	pub fn new(store: Arc<dyn RateStoreAdapter>) -> Self {
		Self { store }
	}

	pub(crate) fn metrics_key(digest: &str) -> String {
		format!("abuse:metrics:{}", digest)
	}

	/// Decodes a stored blob, falling back to fresh metrics on absence or
	/// corruption.
	fn decode(raw: Option<&str>, now: Timestamp) -> AbuseMetrics {
		match raw {
			None => AbuseMetrics::fresh(now),
			Some(raw) => match serde_json::from_str(raw) {
				Ok(metrics) => metrics,
				Err(err) => {
					debug!(error = %err, "corrupt metrics blob, starting fresh");
					AbuseMetrics::fresh(now)
				}
			},
		}
	}

	/// Loads the metrics for a digest, defaulting when absent or corrupt.
	pub async fn load(&self, digest: &str, now: Timestamp) -> ClResult<AbuseMetrics> {
		let raw = self.store.get(&Self::metrics_key(digest)).await?;
		Ok(Self::decode(raw.as_deref(), now))
	}

	/// Loads the metrics for a digest if a decodable blob exists
	/// (diagnostics view; absence and corruption both read as `None`).
	pub async fn peek(&self, digest: &str) -> ClResult<Option<AbuseMetrics>> {
		let raw = self.store.get(&Self::metrics_key(digest)).await?;
		Ok(raw.and_then(|r| serde_json::from_str(&r).ok()))
	}

	/// Records one request outcome, refreshing the retention TTL.
	pub async fn record(
		&self,
		digest: &str,
		success: bool,
		upload_size_bytes: u64,
		now: Timestamp,
	) -> ClResult<()> {
		let key = Self::metrics_key(digest);
		let raw = self.store.get(&key).await?;
		let mut metrics = Self::decode(raw.as_deref(), now);

		metrics.request_count += 1;
		if !success {
			metrics.error_count += 1;
		}
		metrics.upload_size_bytes = metrics.upload_size_bytes.saturating_add(upload_size_bytes);
		metrics.last_request_at = now;

		let blob = serde_json::to_string(&metrics)?;
		self.store.set(&key, &blob, Some(METRICS_TTL_SECS)).await
	}

	/// Deletes the metrics blob (administrative reset).
	pub async fn clear(&self, digest: &str) -> ClResult<()> {
		self.store.delete(&Self::metrics_key(digest)).await
	}
}


// vim: ts=4
