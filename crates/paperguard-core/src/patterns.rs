//! Abuse Pattern Engine
//!
//! Ordered list of heuristic predicates over the tracked behavioral metrics
//! plus request context. Evaluation stops at the first match; a non-warn
//! match escalates the digest by persisting an abuse status with a TTL
//! equal to the pattern's duration. The domain needs no rule composition
//! beyond first-match-wins, so this stays a plain ordered table rather
//! than a rule engine.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::metrics::AbuseMetrics;
use crate::prelude::*;

/// Escalation action of a matched pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbuseAction {
	/// Informational only, nothing is persisted
	Warn,
	/// Admission requires a verified challenge token
	Captcha,
	/// Admission is denied outright
	Block,
}

/// Persisted escalation state of a digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbuseStatus {
	#[default]
	None,
	Captcha,
	Blocked,
}

impl AbuseStatus {
	/// Decodes a stored status value. Unknown or corrupt values read as
	/// `None` rather than failing.
	pub fn from_stored(raw: Option<&str>) -> Self {
		match raw {
			Some("captcha") => AbuseStatus::Captcha,
			Some("blocked") => AbuseStatus::Blocked,
			_ => AbuseStatus::None,
		}
	}

	fn as_stored(self) -> Option<&'static str> {
		match self {
			AbuseStatus::None => None,
			AbuseStatus::Captcha => Some("captcha"),
			AbuseStatus::Blocked => Some("blocked"),
		}
	}
}

/// Read-only snapshot a pattern predicate is evaluated against.
#[derive(Debug, Clone)]
pub struct PatternSnapshot<'a> {
	pub request_count: u64,
	pub error_rate: f64,
	pub upload_size_bytes: u64,
	pub user_agent: &'a str,
	pub referer: &'a str,
	/// Milliseconds between the digest's first request and now
	pub time_window_ms: i64,
}

impl<'a> PatternSnapshot<'a> {
	pub fn new(
		metrics: &AbuseMetrics,
		user_agent: &'a str,
		referer: &'a str,
		now: Timestamp,
	) -> Self {
		Self {
			request_count: metrics.request_count,
			error_rate: metrics.error_rate(),
			upload_size_bytes: metrics.upload_size_bytes,
			user_agent,
			referer,
			time_window_ms: now.millis_since(metrics.first_request_at).max(0),
		}
	}
}

/// A named heuristic predicate with its escalation action.
#[derive(Debug, Clone)]
pub struct AbusePattern {
	pub name: &'static str,
	pub action: AbuseAction,
	/// How long the resulting status stays in force
	pub duration: Duration,
	pub check: fn(&PatternSnapshot<'_>) -> bool,
}

/// Result of a pattern evaluation, returned to the caller for enforcement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
	pub pattern: Box<str>,
	pub action: AbuseAction,
	pub duration_secs: u64,
}

// Heuristic thresholds. Tunable constants, not structural requirements.
const RAPID_FIRE_COUNT: u64 = 30;
const RAPID_FIRE_WINDOW_MS: i64 = 60_000;
const ERROR_RATE_MIN_SAMPLE: u64 = 10;
const ERROR_RATE_LIMIT: f64 = 0.5;
const UPLOAD_FLOOD_BYTES: u64 = 500 * 1024 * 1024;
const UPLOAD_FLOOD_COUNT: u64 = 20;
const AUTOMATION_COUNT: u64 = 10;
const NO_REFERER_COUNT: u64 = 50;
const NO_REFERER_WINDOW_MS: i64 = 300_000;

const AUTOMATION_MARKERS: &[&str] =
	&["curl", "wget", "python-requests", "httpclient", "bot", "spider", "scrapy", "headless"];

fn rapid_fire(s: &PatternSnapshot<'_>) -> bool {
	s.request_count > RAPID_FIRE_COUNT && s.time_window_ms < RAPID_FIRE_WINDOW_MS
}

fn high_error_rate(s: &PatternSnapshot<'_>) -> bool {
	s.request_count >= ERROR_RATE_MIN_SAMPLE && s.error_rate > ERROR_RATE_LIMIT
}

fn upload_flood(s: &PatternSnapshot<'_>) -> bool {
	s.upload_size_bytes > UPLOAD_FLOOD_BYTES && s.request_count > UPLOAD_FLOOD_COUNT
}

fn automation_agent(s: &PatternSnapshot<'_>) -> bool {
	if s.request_count <= AUTOMATION_COUNT {
		return false;
	}
	let ua = s.user_agent.to_ascii_lowercase();
	AUTOMATION_MARKERS.iter().any(|marker| ua.contains(marker))
}

fn no_referer_flood(s: &PatternSnapshot<'_>) -> bool {
	s.referer.is_empty()
		&& s.request_count > NO_REFERER_COUNT
		&& s.time_window_ms < NO_REFERER_WINDOW_MS
}

/// Evaluates the ordered pattern list and persists escalations.
#[derive(Debug, Clone)]
pub struct AbusePatternEngine {
	patterns: Vec<AbusePattern>,
	store: Arc<dyn RateStoreAdapter>,
}

impl AbusePatternEngine {
	pub fn new(store: Arc<dyn RateStoreAdapter>) -> Self {
		Self::with_patterns(store, Self::default_patterns())
	}

	pub fn with_patterns(store: Arc<dyn RateStoreAdapter>, patterns: Vec<AbusePattern>) -> Self {
		Self { patterns, store }
	}

	/// The built-in pattern table, most specific first.
	pub fn default_patterns() -> Vec<AbusePattern> {
		vec![
			AbusePattern {
				name: "rapid-fire",
				action: AbuseAction::Captcha,
				duration: Duration::from_secs(1800),
				check: rapid_fire,
			},
			AbusePattern {
				name: "high-error-rate",
				action: AbuseAction::Block,
				duration: Duration::from_secs(3600),
				check: high_error_rate,
			},
			AbusePattern {
				name: "upload-flood",
				action: AbuseAction::Captcha,
				duration: Duration::from_secs(1800),
				check: upload_flood,
			},
			AbusePattern {
				name: "automation-agent",
				action: AbuseAction::Block,
				duration: Duration::from_secs(7200),
				check: automation_agent,
			},
			AbusePattern {
				name: "no-referer-flood",
				action: AbuseAction::Captcha,
				duration: Duration::from_secs(900),
				check: no_referer_flood,
			},
		]
	}

	pub(crate) fn status_key(digest: &str) -> String {
		format!("abuse:status:{}", digest)
	}

	/// Pure first-match evaluation of the pattern list.
	pub fn evaluate(&self, snapshot: &PatternSnapshot<'_>) -> Option<&AbusePattern> {
		self.patterns.iter().find(|pattern| (pattern.check)(snapshot))
	}

	/// Evaluates and, on a non-warn match, persists the resulting abuse
	/// status with TTL equal to the pattern's duration. Persistence is
	/// best-effort: a store failure is logged and the match is still
	/// returned so the caller can enforce it for the current request.
	pub async fn apply(&self, digest: &str, snapshot: &PatternSnapshot<'_>) -> Option<PatternMatch> {
		let pattern = self.evaluate(snapshot)?;

		let status = match pattern.action {
			AbuseAction::Warn => AbuseStatus::None,
			AbuseAction::Captcha => AbuseStatus::Captcha,
			AbuseAction::Block => AbuseStatus::Blocked,
		};
		if let Some(value) = status.as_stored() {
			let ttl = pattern.duration.as_secs().max(1) as u32;
			if let Err(err) =
				self.store.set(&Self::status_key(digest), value, Some(ttl)).await
			{
				warn!(error = %err, pattern = pattern.name, "failed to persist abuse status");
			}
		}

		Some(PatternMatch {
			pattern: pattern.name.into(),
			action: pattern.action,
			duration_secs: pattern.duration.as_secs(),
		})
	}

	/// Reads the persisted escalation state of a digest.
	pub async fn status(&self, digest: &str) -> ClResult<AbuseStatus> {
		let raw = self.store.get(&Self::status_key(digest)).await?;
		Ok(AbuseStatus::from_stored(raw.as_deref()))
	}

	/// Clears any persisted escalation for a digest.
	pub async fn clear_status(&self, digest: &str) -> ClResult<()> {
		self.store.delete(&Self::status_key(digest)).await
	}
}


// vim: ts=4
