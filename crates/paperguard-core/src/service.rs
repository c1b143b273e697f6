//! Rate Limit Service
//!
//! The orchestrator composing the identity hasher, policy registry, window
//! counters, abuse metrics, pattern engine and challenge verifier into the
//! public admission API. Transient store failures are absorbed here — the
//! admission check fails open, because denying all traffic during a
//! backend outage is worse than temporarily under-enforcing limits.

use serde::Serialize;
use serde_with::skip_serializing_none;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::challenge::{ChallengeConfig, ChallengeVerifier};
use crate::hasher::IdentityHasher;
use crate::metrics::{AbuseMetrics, AbuseMetricsTracker};
use crate::patterns::{
	AbusePattern, AbusePatternEngine, AbuseStatus, PatternMatch, PatternSnapshot,
};
use crate::policy::{PolicyRegistry, RatePolicy};
use crate::prelude::*;
use crate::window::WindowCounterStore;

/// Immutable service configuration, injected at construction and validated
/// once. Invalid configuration is fatal at startup.
#[derive(Debug, Clone)]
pub struct GuardConfig {
	/// Secret salt for the identity hasher
	pub hash_salt: Box<str>,
	/// Challenge provider configuration
	pub challenge: ChallengeConfig,
	/// Admission policy table
	pub policies: Vec<RatePolicy>,
}

impl Default for GuardConfig {
	fn default() -> Self {
		Self {
			// Deployments must override the salt; the default only keeps
			// development setups working.
			hash_salt: "paperguard-dev-salt".into(),
			challenge: ChallengeConfig::default(),
			policies: PolicyRegistry::default_policies(),
		}
	}
}

/// Outcome of one windowed admission check.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
	/// Whether the request may proceed
	pub allowed: bool,
	/// The digest is blocked by a matched abuse pattern
	pub blocked: bool,
	/// Request ceiling of the policy
	pub limit: u32,
	/// Remaining requests in this window
	pub remaining: u32,
	/// Start of the next window
	pub reset_at: Timestamp,
	/// Admission additionally requires a verified challenge token
	pub requires_captcha: bool,
	/// Counter value after this check (0 when the counter was not touched)
	pub count: i64,
}

/// Per-policy slice of the diagnostic status view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
	pub policy: Box<str>,
	pub count: i64,
	pub limit: u32,
	pub remaining: u32,
	pub reset_at: Timestamp,
}

/// Read-only composite view of one identifier's state (operator tooling).
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatusReport {
	pub digest: Box<str>,
	pub policies: Vec<PolicyStatus>,
	pub abuse_status: AbuseStatus,
	pub metrics: Option<AbuseMetrics>,
}

/// The admission-control service.
///
/// Stateless per process: all mutable state lives in the shared store, so
/// any number of instances may run concurrently.
#[derive(Debug, Clone)]
pub struct RateLimitService {
	hasher: IdentityHasher,
	policies: PolicyRegistry,
	windows: WindowCounterStore,
	metrics: AbuseMetricsTracker,
	patterns: AbusePatternEngine,
	verifier: ChallengeVerifier,
	store: Arc<dyn RateStoreAdapter>,
}

impl RateLimitService {
	pub fn new(config: GuardConfig, store: Arc<dyn RateStoreAdapter>) -> ClResult<Self> {
		Self::with_patterns(config, store, AbusePatternEngine::default_patterns())
	}

	/// Creates the service with a custom abuse pattern table.
	pub fn with_patterns(
		config: GuardConfig,
		store: Arc<dyn RateStoreAdapter>,
		patterns: Vec<AbusePattern>,
	) -> ClResult<Self> {
		let hasher = IdentityHasher::new(&config.hash_salt)?;
		let policies = PolicyRegistry::new(config.policies)?;
		let windows = WindowCounterStore::new(store.clone());
		let metrics = AbuseMetricsTracker::new(store.clone());
		let patterns = AbusePatternEngine::with_patterns(store.clone(), patterns);
		let verifier = ChallengeVerifier::new(config.challenge, store.clone())?;

		Ok(Self { hasher, policies, windows, metrics, patterns, verifier, store })
	}

	/// The digest an identifier maps to (diagnostics).
	pub fn hash_identifier(&self, identifier: &str) -> Box<str> {
		self.hasher.hash(identifier)
	}

	/// Windowed admission check: atomically increments the identifier's
	/// counter for the policy's current window and decides admission.
	///
	/// A blocked digest is denied without touching counters. A store
	/// failure fails open with a best-effort remaining estimate.
	pub async fn check_and_increment(
		&self,
		policy_name: &str,
		identifier: &str,
	) -> ClResult<RateLimitDecision> {
		let policy = self.policies.get(policy_name)?;
		let digest = self.hasher.hash(identifier);
		let now = Timestamp::now();

		let status = match self.patterns.status(&digest).await {
			Ok(status) => status,
			Err(err) => {
				warn!(error = %err, policy = policy_name, "abuse status read failed, failing open");
				AbuseStatus::None
			}
		};

		if status == AbuseStatus::Blocked {
			debug!(policy = policy_name, "request denied, digest is blocked");
			return Ok(RateLimitDecision {
				allowed: false,
				blocked: true,
				limit: policy.max_requests,
				remaining: 0,
				reset_at: WindowCounterStore::reset_at(policy, now),
				requires_captcha: false,
				count: 0,
			});
		}

		match self.windows.increment(policy, &digest, now).await {
			Ok(window) => {
				let allowed = window.count <= i64::from(policy.max_requests);
				let remaining = (i64::from(policy.max_requests) - window.count).max(0) as u32;
				Ok(RateLimitDecision {
					allowed,
					blocked: false,
					limit: policy.max_requests,
					remaining,
					reset_at: window.reset_at,
					requires_captcha: status == AbuseStatus::Captcha,
					count: window.count,
				})
			}
			Err(err) => {
				warn!(error = %err, policy = policy_name, "store unavailable, failing open");
				Ok(RateLimitDecision {
					allowed: true,
					blocked: false,
					limit: policy.max_requests,
					remaining: policy.max_requests.saturating_sub(1),
					reset_at: WindowCounterStore::reset_at(policy, now),
					requires_captcha: status == AbuseStatus::Captcha,
					count: 0,
				})
			}
		}
	}

	/// Evaluates the abuse pattern table against the identifier's tracked
	/// metrics and persists the resulting escalation. Store failures are
	/// absorbed; the caller only sees a match or nothing.
	pub async fn check_abuse_patterns(
		&self,
		identifier: &str,
		user_agent: &str,
		referer: &str,
	) -> Option<PatternMatch> {
		let digest = self.hasher.hash(identifier);
		let now = Timestamp::now();

		let metrics = match self.metrics.load(&digest, now).await {
			Ok(metrics) => metrics,
			Err(err) => {
				warn!(error = %err, "metrics read failed, skipping abuse evaluation");
				return None;
			}
		};

		let snapshot = PatternSnapshot::new(&metrics, user_agent, referer, now);
		let matched = self.patterns.apply(&digest, &snapshot).await;
		if let Some(m) = &matched {
			info!(pattern = %m.pattern, action = ?m.action, "abuse pattern matched");
		}
		matched
	}

	/// Records one request outcome: behavioral metrics plus, where the
	/// policy skips successful or failed requests, window counter
	/// adjustment. Store failures are absorbed.
	pub async fn record_request(
		&self,
		policy_name: &str,
		identifier: &str,
		success: bool,
		upload_size_bytes: u64,
	) -> ClResult<()> {
		let policy = self.policies.get(policy_name)?;
		let digest = self.hasher.hash(identifier);
		let now = Timestamp::now();

		if let Err(err) = self.metrics.record(&digest, success, upload_size_bytes, now).await {
			warn!(error = %err, "failed to record request metrics");
		}

		let skip = (success && policy.skip_successful) || (!success && policy.skip_failed);
		if skip {
			if let Err(err) = self.windows.uncount(policy, &digest, now).await {
				warn!(error = %err, policy = policy_name, "failed to adjust window counter");
			}
		}

		Ok(())
	}

	/// Verifies a caller-supplied challenge token, clearing any escalation
	/// for the identifier on success. Fails closed.
	pub async fn verify_challenge(&self, token: &str, identifier: &str) -> bool {
		let digest = self.hasher.hash(identifier);
		self.verifier.verify(token, identifier, &digest).await
	}

	/// Administrative reset: deletes the identifier's current window
	/// counter for the policy plus its abuse status and metrics.
	pub async fn clear_rate_limit(&self, policy_name: &str, identifier: &str) -> ClResult<()> {
		let policy = self.policies.get(policy_name)?;
		let digest = self.hasher.hash(identifier);
		let now = Timestamp::now();

		let keys: Vec<Box<str>> = vec![
			WindowCounterStore::current_key(policy, &digest, now),
			AbusePatternEngine::status_key(&digest).into_boxed_str(),
			AbuseMetricsTracker::metrics_key(&digest).into_boxed_str(),
		];
		self.store.delete_many(&keys).await?;

		info!(policy = policy_name, "rate limit state cleared");
		Ok(())
	}

	/// Read-only composite view across all policies, the abuse status and
	/// the tracked metrics of one identifier.
	pub async fn get_status(&self, identifier: &str) -> ClResult<RateLimitStatusReport> {
		let digest = self.hasher.hash(identifier);
		let now = Timestamp::now();

		let mut policies: Vec<&RatePolicy> = self.policies.iter().collect();
		policies.sort_by(|a, b| a.name.cmp(&b.name));

		let mut statuses = Vec::with_capacity(policies.len());
		for policy in policies {
			let count = self.windows.count(policy, &digest, now).await?;
			statuses.push(PolicyStatus {
				policy: policy.name.clone(),
				count,
				limit: policy.max_requests,
				remaining: (i64::from(policy.max_requests) - count).max(0) as u32,
				reset_at: WindowCounterStore::reset_at(policy, now),
			});
		}

		let abuse_status = self.patterns.status(&digest).await?;
		let metrics = self.metrics.peek(&digest).await?;

		Ok(RateLimitStatusReport { digest, policies: statuses, abuse_status, metrics })
	}
}


// vim: ts=4
