//! Process shell: config load, tracing init, the `/call`/`/logs`/`/healthz` axum
//! router, and graceful shutdown.
//!
//! `axum::Router` + `State<Arc<AppState>>` plus a shutdown `CancellationToken`: every
//! live session actor gets a child of the same token, so a `SIGINT`/`SIGTERM` flushes
//! every in-flight call before the process exits.

mod audio;
mod config;
mod error;
mod functions;
mod observer;
mod protocol;
mod sanitize;
mod session;

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use config::BridgeConfig;
use error::BridgeError;
use functions::FunctionRegistry;
use session::actor::SessionMessage;
use session::manager::SessionManager;

#[derive(Clone)]
struct AppState {
    sessions: SessionManager,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(BridgeConfig::parse());

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    config.validate()?;

    let shutdown = CancellationToken::new();
    let functions = Arc::new(FunctionRegistry::with_defaults());
    let sessions = SessionManager::new(config.clone(), functions, shutdown.clone());
    let state = Arc::new(AppState { sessions });

    // The `/logs` dashboard is a browser client, so permissive CORS matters for its
    // websocket upgrade; `/call`/`/logs` traffic itself is traced like any other
    // request via tower-http.
    let app = Router::new()
        .route("/call", get(call_handler))
        .route("/logs/{call_sid}", get(logs_handler))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.listen_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;
    info!(addr, "callbridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal(shutdown))
        .await?;
    Ok(())
}

/// Cancels `shutdown` (propagating into every live session actor) once the process
/// receives SIGINT or SIGTERM, then returns so axum can stop accepting new
/// connections.
async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, flushing live sessions");
    shutdown.cancel();
    // Give actors a moment to force-flush pending audio and tear down their model
    // sockets before axum finishes draining connections.
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "active_sessions": state.sessions.active_count(),
    }))
}

/// `/call`: the telephony leg. The `callSid` isn't known until the first
/// `start` frame arrives, so the socket is upgraded unconditionally and the session
/// actor is looked up/spawned lazily once that frame is parsed.
async fn call_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_telephony(socket, state))
}

async fn handle_telephony(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<WsMessage>(256);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut handle: Option<session::actor::SessionHandle> = None;

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "telephony socket read error");
                break;
            }
        };
        let text = match msg {
            WsMessage::Text(t) => t,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        let frame: protocol::telephony::TelephonyInbound = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(_) => {
                debug!("malformed telephony frame, dropping");
                continue;
            }
        };

        if handle.is_none() {
            let protocol::telephony::TelephonyInbound::Start { ref start } = frame else {
                debug!("first telephony frame was not `start`, dropping until one arrives");
                continue;
            };
            let h = state.sessions.get_or_create(&start.call_sid);
            h.send(SessionMessage::TelephonyConnected(out_tx.clone())).await;
            handle = Some(h);
        }

        if let Some(h) = &handle {
            h.send(SessionMessage::TelephonyFrame(frame)).await;
        }
    }

    if let Some(h) = handle {
        h.send(SessionMessage::TelephonyClosed).await;
    }
    writer.abort();
}

/// `/logs/:call_sid`: an observer leg. Observers name the call they want
/// to watch explicitly in the path, since — unlike telephony — there's no inbound
/// frame that would otherwise carry a `callSid`. Connecting before the call's
/// `start` frame arrives is fine: `get_or_create` spawns the actor early and
/// telephony picks up the same entry once it connects.
async fn logs_handler(
    ws: WebSocketUpgrade,
    Path(call_sid): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, BridgeError> {
    if call_sid.trim().is_empty() {
        return Err(BridgeError::Upgrade("call_sid path segment must not be empty".to_string()));
    }
    Ok(ws.on_upgrade(move |socket| handle_observer(socket, call_sid, state)))
}

async fn handle_observer(socket: WebSocket, call_sid: String, state: Arc<AppState>) {
    let handle = state.sessions.get_or_create(&call_sid);
    let id = Uuid::new_v4();

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<WsMessage>(64);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    handle.send(SessionMessage::ObserverConnected(id, out_tx)).await;

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        let text = match msg {
            WsMessage::Text(t) => t,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => handle.send(SessionMessage::ObserverFrame(value)).await,
            Err(_) => debug!("malformed observer frame, dropping"),
        }
    }

    handle.send(SessionMessage::ObserverDisconnected(id)).await;
    writer.abort();
}
