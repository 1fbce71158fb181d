use crate::classify::{classify, log_verdict, Verdict};
use crate::config::Config;
use crate::dedupe::{DedupeCache, SystemClock};
use crate::dispatch::Dispatcher;
use crate::ntfy::NtfyClient;
use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

pub async fn run_server(config: Config) -> Result<()> {
    let ntfy = NtfyClient::new(config.topic_url.clone(), config.notify_timeout)?;
    info!("Alerts will be published to {}", ntfy.topic_url());

    let dispatcher = Dispatcher::new(
        Arc::new(ntfy),
        Arc::new(SystemClock),
        DedupeCache::default(),
    );
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
    };

    let app = build_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(handle_report))
        .route("/csp-report", any(handle_report))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Browsers get a 204 for anything that is a POST, whatever happens to the
/// report afterwards.
async fn handle_report(State(state): State<AppState>, method: Method, body: Body) -> Response {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response();
    }

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!("Failed to read report body: {}", e);
            return StatusCode::NO_CONTENT.into_response();
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        warn!("Received empty report body");
        return StatusCode::NO_CONTENT.into_response();
    }

    let payload: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse CSP report: {}", e);
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    let verdict = classify(Some(&payload));
    log_verdict(&verdict);

    if let Verdict::Signal(report) = verdict {
        let dispatcher = state.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch(report.directive(), report.blocked(), &report)
                .await;
        });
    }

    StatusCode::NO_CONTENT.into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
