//! Admission Policies
//!
//! Static table of named admission policies. Policies are immutable
//! configuration records created at startup and validated once; an invalid
//! policy definition is a configuration error, not a runtime error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::prelude::*;

/// An immutable admission policy: a fixed time window and a request ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePolicy {
	/// Policy name, as supplied by the host per request (e.g. "UPLOAD")
	pub name: Box<str>,
	/// Window length in milliseconds
	pub window_ms: i64,
	/// Maximum admitted requests per window
	pub max_requests: u32,
	/// Successful requests do not count toward the ceiling
	#[serde(default)]
	pub skip_successful: bool,
	/// Failed requests do not count toward the ceiling
	#[serde(default)]
	pub skip_failed: bool,
}

/// Validated lookup table of admission policies.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
	policies: HashMap<Box<str>, RatePolicy>,
}

impl PolicyRegistry {
	/// Builds a registry from a policy list, validating every entry.
	pub fn new(policies: Vec<RatePolicy>) -> ClResult<Self> {
		let mut map = HashMap::with_capacity(policies.len());
		for policy in policies {
			if policy.window_ms <= 0 {
				return Err(Error::ConfigError(format!(
					"policy {}: windowMs must be positive, got {}",
					policy.name, policy.window_ms
				)));
			}
			if policy.max_requests == 0 {
				return Err(Error::ConfigError(format!(
					"policy {}: maxRequests must be positive",
					policy.name
				)));
			}
			if map.insert(policy.name.clone(), policy).is_some() {
				return Err(Error::ConfigError("duplicate policy name".into()));
			}
		}
		Ok(Self { policies: map })
	}

	pub fn get(&self, name: &str) -> ClResult<&RatePolicy> {
		self.policies.get(name).ok_or(Error::NotFound)
	}

	pub fn iter(&self) -> impl Iterator<Item = &RatePolicy> {
		self.policies.values()
	}

	pub fn len(&self) -> usize {
		self.policies.len()
	}

	pub fn is_empty(&self) -> bool {
		self.policies.is_empty()
	}

	/// The built-in policy table of the document platform.
	pub fn default_policies() -> Vec<RatePolicy> {
		fn policy(name: &str, window_ms: i64, max_requests: u32) -> RatePolicy {
			RatePolicy {
				name: name.into(),
				window_ms,
				max_requests,
				skip_successful: false,
				skip_failed: false,
			}
		}

		vec![
			policy("UPLOAD", 900_000, 30),
			policy("PROCESS", 900_000, 60),
			policy("DOWNLOAD", 900_000, 120),
			policy("API", 60_000, 60),
			RatePolicy { skip_failed: true, ..policy("PAGE", 60_000, 120) },
		]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_policies_valid() {
		let registry = PolicyRegistry::new(PolicyRegistry::default_policies()).unwrap();
		assert_eq!(registry.len(), 5);
		assert!(registry.get("UPLOAD").is_ok());
		assert!(registry.get("PAGE").is_ok());
	}

	#[test]
	fn test_unknown_policy() {
		let registry = PolicyRegistry::new(PolicyRegistry::default_policies()).unwrap();
		assert!(matches!(registry.get("NOPE"), Err(Error::NotFound)));
	}

	#[test]
	fn test_rejects_zero_ceiling() {
		let result = PolicyRegistry::new(vec![RatePolicy {
			name: "BAD".into(),
			window_ms: 60_000,
			max_requests: 0,
			skip_successful: false,
			skip_failed: false,
		}]);
		assert!(matches!(result, Err(Error::ConfigError(_))));
	}

	#[test]
	fn test_rejects_non_positive_window() {
		let result = PolicyRegistry::new(vec![RatePolicy {
			name: "BAD".into(),
			window_ms: 0,
			max_requests: 10,
			skip_successful: false,
			skip_failed: false,
		}]);
		assert!(matches!(result, Err(Error::ConfigError(_))));
	}

	#[test]
	fn test_rejects_duplicate_names() {
		let mut policies = PolicyRegistry::default_policies();
		policies.push(RatePolicy {
			name: "API".into(),
			window_ms: 1000,
			max_requests: 1,
			skip_successful: false,
			skip_failed: false,
		});
		assert!(matches!(PolicyRegistry::new(policies), Err(Error::ConfigError(_))));
	}
}

// vim: ts=4
