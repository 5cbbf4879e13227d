//! Spectra-Engine Main Application
//!
//! Speculative-decoding accelerator with live generation telemetry.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::middleware;
use spectra_engine::api::{build_router, AppState};
use spectra_engine::config::SpectraConfig;
use spectra_engine::draft::reference::NgramDraftModel;
use spectra_engine::metrics::create_metrics;
use spectra_engine::target::http::HttpTargetCollaborator;
use spectra_engine::utils::rate_limit::rate_limit_middleware;
use spectra_engine::utils::RateLimiter;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let config = SpectraConfig::load();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.logging.level.clone())
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting spectra-engine v{}", env!("CARGO_PKG_VERSION"));

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config error: {}", e);
        }
        std::process::exit(1);
    }

    if config.server.host == "0.0.0.0" {
        warn!("server will accept connections from any interface (0.0.0.0)");
    }

    let draft = Arc::new(NgramDraftModel::new(&config.speculation.draft_model));
    let target = Arc::new(HttpTargetCollaborator::new(
        config.target.base_url.clone(),
        config.target.model.clone(),
        config
            .target
            .api_key
            .clone()
            .expect("validated config always carries a target api key"),
        config.target.request_timeout_secs,
    ));
    let metrics = create_metrics(config.speculation.metrics_window);

    info!(
        draft_model = %config.speculation.draft_model,
        target_model = %config.target.model,
        "collaborators initialised"
    );

    let config = Arc::new(config);
    let app_state = AppState {
        draft,
        target,
        metrics: metrics.clone(),
        config: config.clone(),
        start_time: Instant::now(),
    };

    let mut app = build_router(app_state);

    if !config.server.cors_origins.is_empty() {
        let cors = if config.server.cors_origins.iter().any(|o| o == "*") {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .server
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        };
        app = app.layer(cors);
    }

    if config.server.rate_limit_enabled {
        let rate_limiter = RateLimiter::new(
            config.server.rate_limit_max_requests,
            config.server.rate_limit_window_secs,
        );
        app = app.layer(middleware::from_fn_with_state(
            rate_limiter.clone(),
            rate_limit_middleware,
        ));

        let window_secs = config.server.rate_limit_window_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(window_secs));
            loop {
                interval.tick().await;
                rate_limiter.cleanup().await;
            }
        });

        info!(
            "rate limiting enabled: {} requests / {}s",
            config.server.rate_limit_max_requests, config.server.rate_limit_window_secs
        );
    }

    app = app.layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let socket_addr: SocketAddr = addr.parse().unwrap_or_else(|e| {
        error!("invalid socket address '{}': {}", addr, e);
        std::process::exit(1);
    });

    let listener = match tokio::net::TcpListener::bind(&socket_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind to {}: {}", socket_addr, e);
            std::process::exit(1);
        }
    };

    info!("listening on ws://{}/v1/generate", socket_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(metrics))
        .await
    {
        error!("server error: {}", e);
        std::process::exit(1);
    }

    info!("server shut down gracefully");
}

/// Wait for a shutdown signal, then drain active speculation sessions
/// before returning control to `axum::serve`.
async fn shutdown_signal(metrics: spectra_engine::SharedMetrics) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("failed to install signal handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received terminate signal"),
    }

    info!("initiating graceful shutdown...");

    let max_wait = std::time::Duration::from_secs(30);
    let start = Instant::now();
    while metrics.active_sessions.load(Ordering::Relaxed) > 0 && start.elapsed() < max_wait {
        let active = metrics.active_sessions.load(Ordering::Relaxed);
        info!("waiting for {} active sessions to finish...", active);
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }

    let remaining = metrics.active_sessions.load(Ordering::Relaxed);
    if remaining > 0 {
        warn!(
            "shutdown timeout reached with {} sessions still active",
            remaining
        );
    } else {
        info!("all sessions completed");
    }
}
