//! Challenge Verification
//!
//! Confirms a caller-supplied proof token against the external challenge
//! provider. This check exists specifically to gate abuse, so it fails
//! closed: a token that cannot be verified — transport error, non-success
//! reply, undecodable body — is never treated as valid. A successful
//! verification clears the digest's escalation, since the caller has
//! proven good faith.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::patterns::AbusePatternEngine;
use crate::prelude::*;

/// Challenge provider configuration.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
	/// Verification endpoint of the challenge provider
	pub verify_url: Box<str>,
	/// Shared secret for the provider; empty disables verification
	pub secret: Box<str>,
}

impl Default for ChallengeConfig {
	fn default() -> Self {
		Self {
			verify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify".into(),
			secret: "".into(),
		}
	}
}

#[derive(Debug, Deserialize)]
struct VerifyReply {
	#[serde(default)]
	success: bool,
}

/// Verifies challenge tokens against the external provider.
#[derive(Debug, Clone)]
pub struct ChallengeVerifier {
	config: ChallengeConfig,
	client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
	store: Arc<dyn RateStoreAdapter>,
}

impl ChallengeVerifier {
	pub fn new(config: ChallengeConfig, store: Arc<dyn RateStoreAdapter>) -> ClResult<Self> {
		let connector = HttpsConnectorBuilder::new()
			.with_native_roots()
			.map_err(|err| Error::ConfigError(format!("TLS root store error: {}", err)))?
			.https_or_http()
			.enable_http1()
			.build();
		let client = Client::builder(TokioExecutor::new()).build(connector);

		Ok(Self { config, client, store })
	}

	/// Verifies a caller-supplied token, clearing the digest's escalation
	/// on success. Returns false for anything short of a confirmed success.
	pub async fn verify(&self, token: &str, identifier: &str, digest: &str) -> bool {
		if self.config.secret.is_empty() {
			warn!("challenge verification requested but no secret is configured");
			return false;
		}

		let payload = serde_json::json!({
			"secret": self.config.secret.as_ref(),
			"response": token,
			"remoteip": identifier,
		});

		let request = match hyper::Request::builder()
			.method(hyper::Method::POST)
			.uri(self.config.verify_url.as_ref())
			.header("Content-Type", "application/json")
			.body(Full::new(Bytes::from(payload.to_string())))
		{
			Ok(req) => req,
			Err(err) => {
				warn!(error = %err, "failed to build challenge verification request");
				return false;
			}
		};

		let response = match self.client.request(request).await {
			Ok(res) => res,
			Err(err) => {
				warn!(error = %err, "challenge verification transport error");
				return false;
			}
		};

		if !response.status().is_success() {
			warn!(status = %response.status(), "challenge provider returned non-success");
			return false;
		}

		let body = match response.into_body().collect().await {
			Ok(body) => body.to_bytes(),
			Err(err) => {
				warn!(error = %err, "failed to read challenge provider reply");
				return false;
			}
		};

		let reply: VerifyReply = match serde_json::from_slice(&body) {
			Ok(reply) => reply,
			Err(err) => {
				warn!(error = %err, "undecodable challenge provider reply");
				return false;
			}
		};

		if !reply.success {
			debug!("challenge token rejected by provider");
			return false;
		}

		// Proven good faith: drop any escalation for this digest. A failed
		// delete only means the status lives until its TTL.
		if let Err(err) = self.store.delete(&AbusePatternEngine::status_key(digest)).await {
			warn!(error = %err, "failed to clear abuse status after verified challenge");
		}

		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::routing::post;
	use axum::{Json, Router};
	use paperguard_store_adapter_memory::RateAdapterMemory;

	async fn spawn_provider(success: bool) -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let app = Router::new().route(
			"/verify",
			post(move || async move { Json(serde_json::json!({ "success": success })) }),
		);
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}/verify", addr)
	}

	fn verifier(verify_url: String, store: Arc<RateAdapterMemory>) -> ChallengeVerifier {
		let config = ChallengeConfig { verify_url: verify_url.into(), secret: "sk-test".into() };
		ChallengeVerifier::new(config, store).unwrap()
	}

	#[tokio::test]
	async fn test_verify_success_clears_status() {
		let store = Arc::new(RateAdapterMemory::new());
		store
			.set(&AbusePatternEngine::status_key("digest"), "captcha", None)
			.await
			.unwrap();

		let url = spawn_provider(true).await;
		let verifier = verifier(url, store.clone());

		assert!(verifier.verify("token", "192.168.1.100", "digest").await);
		assert!(store.get(&AbusePatternEngine::status_key("digest")).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_verify_rejection_keeps_status() {
		let store = Arc::new(RateAdapterMemory::new());
		store
			.set(&AbusePatternEngine::status_key("digest"), "captcha", None)
			.await
			.unwrap();

		let url = spawn_provider(false).await;
		let verifier = verifier(url, store.clone());

		assert!(!verifier.verify("token", "192.168.1.100", "digest").await);
		assert!(store.get(&AbusePatternEngine::status_key("digest")).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_verify_fails_closed_on_transport_error() {
		let store = Arc::new(RateAdapterMemory::new());
		// Nothing listens here; the connection is refused
		let verifier = verifier("http://127.0.0.1:1/verify".to_string(), store);

		assert!(!verifier.verify("token", "192.168.1.100", "digest").await);
	}

	#[tokio::test]
	async fn test_verify_fails_closed_without_secret() {
		let store = Arc::new(RateAdapterMemory::new());
		let config = ChallengeConfig { secret: "".into(), ..ChallengeConfig::default() };
		let verifier = ChallengeVerifier::new(config, store).unwrap();

		assert!(!verifier.verify("token", "192.168.1.100", "digest").await);
	}
}

// vim: ts=4
