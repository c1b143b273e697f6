//! Admission control for the Paperguard platform.
//!
//! Decides, per incoming request, whether to admit, challenge or reject the
//! caller: fixed-window rate limiting, behavioral abuse detection and
//! challenge (captcha) gating, all coordinated across service instances
//! through a shared key-value store. The service holds no authoritative
//! in-memory state, so any number of instances can run behind a load
//! balancer.

#![forbid(unsafe_code)]

pub mod api;
pub mod challenge;
pub mod error;
pub mod hasher;
pub mod metrics;
pub mod patterns;
pub mod policy;
pub mod prelude;
pub mod service;
pub mod window;

// Re-export commonly used types
pub use api::{Decision, RequestContext};
pub use challenge::{ChallengeConfig, ChallengeVerifier};
pub use error::RateLimitError;
pub use hasher::IdentityHasher;
pub use metrics::{AbuseMetrics, AbuseMetricsTracker};
pub use patterns::{AbuseAction, AbusePattern, AbusePatternEngine, AbuseStatus, PatternMatch};
pub use policy::{PolicyRegistry, RatePolicy};
pub use service::{GuardConfig, RateLimitDecision, RateLimitService, RateLimitStatusReport};
pub use window::WindowCounterStore;

// vim: ts=4
