mod config;
mod error;
mod handlers;
mod identity;
mod load_balancer;
mod metrics;
mod middleware;
mod models;
mod rate_limit;
mod routes;
mod state;

use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Args, RoutePolicies};
use crate::load_balancer::{LoadBalancer, health_checker};
use crate::middleware::RateLimitGuard;
use crate::rate_limit::RateLimiter;
use crate::rate_limit::sweeper::expiry_sweeper;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pitchconnect_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments, bad limits stop us here
    let args = Args::parse();
    let policies = RoutePolicies::from_args(&args)?;
    let sweep_interval = args.sweep_interval()?;
    let health_interval = args.health_interval()?;
    let load_balancer = Arc::new(LoadBalancer::new(&args.backends)?);

    let limiter = Arc::new(RateLimiter::in_memory());
    let client = reqwest::Client::new();

    let state = Arc::new(AppState {
        client: client.clone(),
        load_balancer: load_balancer.clone(),
        rate_limit: RateLimitGuard::new(limiter.clone(), policies),
        max_body_bytes: args.max_body_bytes,
    });

    tokio::spawn(health_checker(
        load_balancer,
        client,
        health_interval,
        args.health_path.clone(),
    ));
    tokio::spawn(expiry_sweeper(limiter, sweep_interval));

    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("gateway listening on http://{}", addr);
    tracing::info!(
        "rate limit: {} requests per {}ms ({} route overrides)",
        args.rate_limit,
        args.rate_window_ms,
        args.route_limits.len()
    );
    for route in &args.route_limits {
        tracing::info!(
            prefix = %route.prefix,
            max_requests = ?route.max_requests,
            window_ms = ?route.window_ms,
            "route override"
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
