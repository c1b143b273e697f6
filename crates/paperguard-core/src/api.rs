//! Host Adapter Surface
//!
//! The narrow interface host frameworks consume: a request context in, an
//! admission decision out, keeping the decision logic framework-agnostic.
//! One thin axum adapter lives here too — a middleware function plus the
//! administrative routes for operator tooling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::header::{CONTENT_LENGTH, REFERER, USER_AGENT};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::error::RateLimitError;
use crate::patterns::AbuseAction;
use crate::prelude::*;
use crate::service::{RateLimitService, RateLimitStatusReport};

/// Header carrying the caller-supplied challenge token
pub const CHALLENGE_TOKEN_HEADER: &str = "x-challenge-token";

/// Everything the service needs to know about one request.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
	/// Raw caller identifier (never persisted, hashed before storage)
	pub identifier: &'a str,
	/// Admission policy name for this request
	pub policy: &'a str,
	pub user_agent: &'a str,
	pub referer: &'a str,
	/// Proof token from the challenge provider, if the caller supplied one
	pub challenge_token: Option<&'a str>,
}

/// The admission decision a host translates into a transport response.
#[derive(Debug)]
pub enum Decision {
	Allow {
		limit: u32,
		remaining: u32,
		reset_at: Timestamp,
	},
	Deny(RateLimitError),
}

impl RateLimitService {
	/// Runs the full admission flow for one request: abuse pattern
	/// evaluation, then the windowed admission check, then the challenge
	/// gate. Only an unknown policy name is an error; infrastructure
	/// failures degrade inside the service.
	pub async fn evaluate(&self, ctx: &RequestContext<'_>) -> ClResult<Decision> {
		if let Some(matched) =
			self.check_abuse_patterns(ctx.identifier, ctx.user_agent, ctx.referer).await
		{
			if matched.action == AbuseAction::Block {
				return Ok(Decision::Deny(RateLimitError::Blocked {
					retry_after: Some(Duration::from_secs(matched.duration_secs)),
				}));
			}
		}

		let decision = self.check_and_increment(ctx.policy, ctx.identifier).await?;
		if decision.blocked {
			return Ok(Decision::Deny(RateLimitError::Blocked { retry_after: None }));
		}
		if !decision.allowed {
			return Ok(Decision::Deny(RateLimitError::RateLimited {
				limit: decision.limit,
				remaining: decision.remaining,
				reset_at: decision.reset_at,
			}));
		}

		if decision.requires_captcha {
			match ctx.challenge_token {
				Some(token) if self.verify_challenge(token, ctx.identifier).await => {}
				_ => return Ok(Decision::Deny(RateLimitError::CaptchaRequired)),
			}
		}

		Ok(Decision::Allow {
			limit: decision.limit,
			remaining: decision.remaining,
			reset_at: decision.reset_at,
		})
	}
}

/// Builds a request context from an HTTP request's headers.
pub fn context_from_request<'a, B>(
	req: &'a axum::http::Request<B>,
	identifier: &'a str,
	policy: &'a str,
) -> RequestContext<'a> {
	let header = |name| req.headers().get(name).and_then(|v| v.to_str().ok());

	RequestContext {
		identifier,
		policy,
		user_agent: header(USER_AGENT.as_str()).unwrap_or(""),
		referer: header(REFERER.as_str()).unwrap_or(""),
		challenge_token: header(CHALLENGE_TOKEN_HEADER),
	}
}

/// Axum middleware enforcing one admission policy on a route tree.
///
/// Use with `middleware::from_fn_with_state((service, "UPLOAD"), guard_middleware)`
/// and `into_make_service_with_connect_info::<SocketAddr>()` on the router.
pub async fn guard_middleware(
	State((service, policy)): State<(Arc<RateLimitService>, &'static str)>,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	req: Request,
	next: Next,
) -> Response {
	let identifier = addr.ip().to_string();
	let upload_size = req
		.headers()
		.get(CONTENT_LENGTH)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.parse::<u64>().ok())
		.unwrap_or(0);

	{
		let ctx = context_from_request(&req, &identifier, policy);
		match service.evaluate(&ctx).await {
			Ok(Decision::Allow { .. }) => {}
			Ok(Decision::Deny(reason)) => {
				// A denial is a failed request; it still feeds the behavioral
				// metrics, otherwise over-limit traffic could never escalate.
				if let Err(err) =
					service.record_request(policy, &identifier, false, upload_size).await
				{
					tracing::warn!(error = %err, policy, "failed to record request outcome");
				}
				return reason.into_response();
			}
			Err(err) => return err.into_response(),
		}
	}

	let response = next.run(req).await;

	let success = !(response.status().is_client_error() || response.status().is_server_error());
	if let Err(err) = service.record_request(policy, &identifier, success, upload_size).await {
		tracing::warn!(error = %err, policy, "failed to record request outcome");
	}

	response
}

/// Administrative routes for operator tooling (not end-user paths).
pub fn admin_routes() -> Router<Arc<RateLimitService>> {
	Router::new()
		.route("/status/{identifier}", get(get_status))
		.route("/limits/{policy}/{identifier}", delete(delete_limit))
}

/// GET /status/{identifier} - composite rate limit and abuse state view
async fn get_status(
	State(service): State<Arc<RateLimitService>>,
	Path(identifier): Path<String>,
) -> ClResult<Json<ApiResponse<RateLimitStatusReport>>> {
	let report = service.get_status(&identifier).await?;
	Ok(Json(ApiResponse::new(report)))
}

/// DELETE /limits/{policy}/{identifier} - reset one identifier's state
async fn delete_limit(
	State(service): State<Arc<RateLimitService>>,
	Path((policy, identifier)): Path<(String, String)>,
) -> ClResult<StatusCode> {
	service.clear_rate_limit(&policy, &identifier).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::challenge::ChallengeConfig;
	use crate::patterns::{AbusePattern, PatternSnapshot};
	use crate::policy::RatePolicy;
	use crate::service::GuardConfig;
	use paperguard_store_adapter_memory::RateAdapterMemory;

	fn ctx<'a>(identifier: &'a str, token: Option<&'a str>) -> RequestContext<'a> {
		RequestContext {
			identifier,
			policy: "TEST",
			user_agent: "Mozilla/5.0",
			referer: "https://example.com",
			challenge_token: token,
		}
	}

	fn config(max_requests: u32) -> GuardConfig {
		GuardConfig {
			policies: vec![RatePolicy {
				name: "TEST".into(),
				window_ms: 900_000,
				max_requests,
				skip_successful: false,
				skip_failed: false,
			}],
			..GuardConfig::default()
		}
	}

	#[tokio::test]
	async fn test_evaluate_allows_within_ceiling() {
		let service =
			RateLimitService::new(config(5), Arc::new(RateAdapterMemory::new())).unwrap();

		match service.evaluate(&ctx("1.2.3.4", None)).await.unwrap() {
			Decision::Allow { limit, remaining, .. } => {
				assert_eq!(limit, 5);
				assert_eq!(remaining, 4);
			}
			Decision::Deny(reason) => panic!("unexpected denial: {}", reason),
		}
	}

	#[tokio::test]
	async fn test_evaluate_denies_over_ceiling() {
		let service =
			RateLimitService::new(config(2), Arc::new(RateAdapterMemory::new())).unwrap();

		for _ in 0..2 {
			assert!(matches!(
				service.evaluate(&ctx("1.2.3.4", None)).await.unwrap(),
				Decision::Allow { .. }
			));
		}
		match service.evaluate(&ctx("1.2.3.4", None)).await.unwrap() {
			Decision::Deny(RateLimitError::RateLimited { limit, remaining, .. }) => {
				assert_eq!(limit, 2);
				assert_eq!(remaining, 0);
			}
			other => panic!("expected rate limited, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_evaluate_blocks_on_matched_pattern() {
		fn always(_: &PatternSnapshot<'_>) -> bool {
			true
		}
		let service = RateLimitService::with_patterns(
			config(5),
			Arc::new(RateAdapterMemory::new()),
			vec![AbusePattern {
				name: "always-block",
				action: AbuseAction::Block,
				duration: Duration::from_secs(60),
				check: always,
			}],
		)
		.unwrap();

		match service.evaluate(&ctx("1.2.3.4", None)).await.unwrap() {
			Decision::Deny(RateLimitError::Blocked { retry_after }) => {
				assert_eq!(retry_after, Some(Duration::from_secs(60)));
			}
			other => panic!("expected blocked, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_evaluate_requires_challenge_when_flagged() {
		let store = Arc::new(RateAdapterMemory::new());
		let service = RateLimitService::new(config(5), store.clone()).unwrap();
		let digest = service.hash_identifier("1.2.3.4");
		store
			.set(&crate::patterns::AbusePatternEngine::status_key(&digest), "captcha", None)
			.await
			.unwrap();

		// No token: denied pending verification
		assert!(matches!(
			service.evaluate(&ctx("1.2.3.4", None)).await.unwrap(),
			Decision::Deny(RateLimitError::CaptchaRequired)
		));

		// Unverifiable token (no provider reachable): still denied
		assert!(matches!(
			service.evaluate(&ctx("1.2.3.4", Some("token"))).await.unwrap(),
			Decision::Deny(RateLimitError::CaptchaRequired)
		));
	}

	#[tokio::test]
	async fn test_evaluate_admits_with_verified_token() {
		use axum::routing::post;

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let app = Router::new().route(
			"/verify",
			post(|| async { Json(serde_json::json!({ "success": true })) }),
		);
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});

		let store = Arc::new(RateAdapterMemory::new());
		let service = RateLimitService::new(
			GuardConfig {
				challenge: ChallengeConfig {
					verify_url: format!("http://{}/verify", addr).into(),
					secret: "sk-test".into(),
				},
				..config(5)
			},
			store.clone(),
		)
		.unwrap();
		let digest = service.hash_identifier("1.2.3.4");
		store
			.set(&crate::patterns::AbusePatternEngine::status_key(&digest), "captcha", None)
			.await
			.unwrap();

		assert!(matches!(
			service.evaluate(&ctx("1.2.3.4", Some("token"))).await.unwrap(),
			Decision::Allow { .. }
		));
	}

	#[tokio::test]
	async fn test_middleware_records_denied_requests() {
		use http_body_util::Full;
		use hyper::body::Bytes;
		use hyper_util::client::legacy::Client;
		use hyper_util::rt::TokioExecutor;

		let store = Arc::new(RateAdapterMemory::new());
		let service = Arc::new(RateLimitService::new(config(2), store).unwrap());

		let app = Router::new()
			.route("/", get(|| async { "ok" }))
			.layer(axum::middleware::from_fn_with_state(
				(service.clone(), "TEST"),
				guard_middleware,
			));
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
				.await
				.unwrap();
		});

		let client: Client<_, Full<Bytes>> =
			Client::builder(TokioExecutor::new()).build_http();
		let url: hyper::Uri = format!("http://{}/", addr).parse().unwrap();

		let mut last_status = StatusCode::OK;
		for _ in 0..5 {
			last_status = client.get(url.clone()).await.unwrap().status();
		}
		assert_eq!(last_status, StatusCode::TOO_MANY_REQUESTS);

		// 2 admitted, 3 denied; every one of them shows up in the metrics
		let report = service.get_status("127.0.0.1").await.unwrap();
		let metrics = report.metrics.unwrap();
		assert_eq!(metrics.request_count, 5);
		assert_eq!(metrics.error_count, 3);
	}

	#[test]
	fn test_context_from_request_headers() {
		let req = axum::http::Request::builder()
			.uri("/api/upload")
			.header(USER_AGENT, "curl/8.5.0")
			.header(REFERER, "https://example.com/tools")
			.header(CHALLENGE_TOKEN_HEADER, "tok-123")
			.body(())
			.unwrap();

		let ctx = context_from_request(&req, "1.2.3.4", "UPLOAD");
		assert_eq!(ctx.user_agent, "curl/8.5.0");
		assert_eq!(ctx.referer, "https://example.com/tools");
		assert_eq!(ctx.challenge_token, Some("tok-123"));
		assert_eq!(ctx.policy, "UPLOAD");
	}
}

// vim: ts=4
