use std::env;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, routing::get, routing::post, Router};

use paperguard_core::api::{admin_routes, guard_middleware};
use paperguard_core::challenge::ChallengeConfig;
use paperguard_core::prelude::*;
use paperguard_core::service::{GuardConfig, RateLimitService};
use paperguard_store_adapter_memory::RateAdapterMemory;
use paperguard_store_adapter_redis::RateAdapterRedis;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	tracing_subscriber::fmt::init();

	let store: Arc<dyn RateStoreAdapter> = match env::var("REDIS_URL") {
		Ok(url) => Arc::new(RateAdapterRedis::connect(&url).await?),
		Err(_) => Arc::new(RateAdapterMemory::new()),
	};

	let config = GuardConfig {
		hash_salt: env::var("HASH_SALT").unwrap_or("paperguard-dev-salt".to_string()).into(),
		challenge: ChallengeConfig {
			secret: env::var("CHALLENGE_SECRET").unwrap_or_default().into(),
			..ChallengeConfig::default()
		},
		..GuardConfig::default()
	};
	let service = Arc::new(RateLimitService::new(config, store)?);

	let guarded = |policy: &'static str| {
		middleware::from_fn_with_state((service.clone(), policy), guard_middleware)
	};

	let app = Router::new()
		.route("/api/upload", post(|| async { "uploaded" }).layer(guarded("UPLOAD")))
		.route("/api/data", get(|| async { "data" }).layer(guarded("API")))
		.route("/", get(|| async { "paperguard demo" }).layer(guarded("PAGE")))
		.nest("/admin", admin_routes().with_state(service.clone()));

	let port = env::var("PORT").unwrap_or("8080".to_string());
	let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
	println!("listening on {}", listener.local_addr()?);
	axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

	Ok(())
}

// vim: ts=4
