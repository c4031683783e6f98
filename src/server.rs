//! HTTP relay for a browser shim.
//!
//! The in-page shim forwards browser events and sampled sources to this
//! server, which drives a [`SessionMonitor`] over a [`Relay`] platform and
//! hands dialogs and notices back when the shim polls.
//!
//! # Architecture
//!
//! ```text
//! Browser shim ──→ POST /signals, /samples ──→ monitor ──→ dialogs, notices
//!       ▲                                                      │
//!       └─────────────────── GET /session ◀─────────────────────┘
//! ```

use crate::audit::{create_shared_log, SharedAuditLog};
use crate::config::Config;
use crate::core::host::{HostInbox, RecordingHost};
use crate::core::monitor::{MonitorError, MonitorState, SessionMonitor};
use crate::core::report::SessionReport;
use crate::core::types::{ProblemContext, ViolationKind};
use crate::detect::Disposition;
use crate::source::relay::{Relay, Sample};
use crate::source::types::Signal;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Monitor configuration for sessions started through the relay
    pub config: Config,
    /// How often scheduled polls are run
    pub tick_interval: Duration,
}

impl ServerConfig {
    pub fn new(port: u16, config: Config) -> Self {
        Self {
            port,
            config,
            tick_interval: Duration::from_millis(50),
        }
    }
}

/// Shared server state
pub struct ServerState {
    monitor: Mutex<SessionMonitor>,
    relay: Relay,
    host: RecordingHost,
    audit: SharedAuditLog,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        let relay = Relay::new();
        let host = RecordingHost::new();
        let audit = create_shared_log();
        let monitor = SessionMonitor::new(
            config.config.clone(),
            relay.platform(),
            Box::new(host.clone()),
            audit.clone(),
        );
        Self {
            monitor: Mutex::new(monitor),
            relay,
            host,
            audit,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub problem_id: String,
    #[serde(default)]
    pub title: String,
}

/// A browser event, optionally stamped by the shim.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalIn {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
    pub signal: Signal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalBatch {
    pub signals: Vec<SignalIn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalResponse {
    /// One entry per submitted signal, in order
    pub dispositions: Vec<Disposition>,
    pub state: MonitorState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleBatch {
    pub samples: Vec<Sample>,
}

/// Session snapshot. Dialogs and notices are handed out once.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub state: MonitorState,
    pub violation_counts: BTreeMap<ViolationKind, u32>,
    pub warning_popups_shown: u32,
    pub pending: HostInbox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SessionReport>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub signals_received: u64,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn monitor_error(e: MonitorError) -> ApiError {
    let (status, code) = match &e {
        MonitorError::AlreadyRunning => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
        MonitorError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE"),
        MonitorError::Precondition(_) => (StatusCode::PRECONDITION_FAILED, "PRECONDITION_FAILED"),
        MonitorError::OverrideNotAllowed => (StatusCode::FORBIDDEN, "OVERRIDE_NOT_ALLOWED"),
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: code.to_string(),
        }),
    )
}

fn view(state: &ServerState, monitor: &SessionMonitor) -> SessionView {
    let (violation_counts, warning_popups_shown) = match monitor.session() {
        Some(session) => (
            session.aggregator().violation_counts().clone(),
            session.aggregator().warning_popups_shown(),
        ),
        None => (BTreeMap::new(), 0),
    };
    SessionView {
        state: monitor.state().clone(),
        violation_counts,
        warning_popups_shown,
        pending: state.host.drain(),
        report: monitor.last_report().cloned(),
    }
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        signals_received: state.audit.stats().signals_received,
    })
}

/// GET /session
async fn session(State(state): State<Arc<ServerState>>) -> Json<SessionView> {
    let monitor = state.monitor.lock().await;
    Json(view(&state, &monitor))
}

/// POST /session/start
async fn start(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let mut monitor = state.monitor.lock().await;
    monitor
        .start(
            ProblemContext::new(request.problem_id, request.title),
            Utc::now(),
        )
        .map_err(monitor_error)?;
    Ok(Json(view(&state, &monitor)))
}

/// POST /signals
async fn signals(
    State(state): State<Arc<ServerState>>,
    Json(batch): Json<SignalBatch>,
) -> Json<SignalResponse> {
    let mut monitor = state.monitor.lock().await;
    let mut dispositions = Vec::with_capacity(batch.signals.len());
    for SignalIn { at, signal } in batch.signals {
        if let Signal::FullscreenChanged { active } = signal {
            state.relay.set_fullscreen_active(active);
        }
        dispositions.push(monitor.handle_signal(signal, at.unwrap_or_else(Utc::now)));
    }
    Json(SignalResponse {
        dispositions,
        state: monitor.state().clone(),
    })
}

/// POST /samples
async fn samples(
    State(state): State<Arc<ServerState>>,
    Json(batch): Json<SampleBatch>,
) -> StatusCode {
    for sample in batch.samples {
        state.relay.push(sample);
    }
    StatusCode::NO_CONTENT
}

async fn acknowledge(State(state): State<Arc<ServerState>>) -> Result<Json<SessionView>, ApiError> {
    let mut monitor = state.monitor.lock().await;
    monitor.acknowledge_warning(Utc::now()).map_err(monitor_error)?;
    Ok(Json(view(&state, &monitor)))
}

async fn continue_anyway(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<SessionView>, ApiError> {
    let mut monitor = state.monitor.lock().await;
    monitor.continue_anyway(Utc::now()).map_err(monitor_error)?;
    Ok(Json(view(&state, &monitor)))
}

async fn recheck(State(state): State<Arc<ServerState>>) -> Result<Json<SessionView>, ApiError> {
    let mut monitor = state.monitor.lock().await;
    monitor.recheck(Utc::now()).map_err(monitor_error)?;
    Ok(Json(view(&state, &monitor)))
}

async fn return_to_fullscreen(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<SessionView>, ApiError> {
    let mut monitor = state.monitor.lock().await;
    monitor
        .return_to_fullscreen(Utc::now())
        .map_err(monitor_error)?;
    Ok(Json(view(&state, &monitor)))
}

async fn end_test(State(state): State<Arc<ServerState>>) -> Result<Json<SessionView>, ApiError> {
    let mut monitor = state.monitor.lock().await;
    monitor.end_test(Utc::now()).map_err(monitor_error)?;
    Ok(Json(view(&state, &monitor)))
}

async fn stop(State(state): State<Arc<ServerState>>) -> Json<SessionView> {
    let mut monitor = state.monitor.lock().await;
    monitor.stop(Utc::now());
    Json(view(&state, &monitor))
}

async fn tick_loop(state: Arc<ServerState>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let mut monitor = state.monitor.lock().await;
                monitor.pump();
                monitor.tick(Utc::now());
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("tick loop stopped");
}

/// Build the router over `state`.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(session))
        .route("/session/start", post(start))
        .route("/session/acknowledge", post(acknowledge))
        .route("/session/continue", post(continue_anyway))
        .route("/session/recheck", post(recheck))
        .route("/session/fullscreen", post(return_to_fullscreen))
        .route("/session/end", post(end_test))
        .route("/session/stop", post(stop))
        .route("/signals", post(signals))
        .route("/samples", post(samples))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config));
    let app = router(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Proctor relay listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let (ticks_tx, ticks_rx) = watch::channel(false);

    tokio::spawn(tick_loop(state, config.tick_interval, ticks_rx));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                let _ = ticks_tx.send(true);
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
