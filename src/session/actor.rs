//! The session actor: one task per call, driven by a channel of typed messages.
//! All state transitions happen here; nothing about a `Session` is ever touched
//! from another task.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message as WsMessage;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as ModelMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::normalize_audio_format;
use crate::config::BridgeConfig;
use crate::functions::FunctionRegistry;
use crate::observer::{self, ObserverFrameDecision};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::registry::is_client_event;
use crate::protocol::server_events::{FunctionCallItem, ServerEvent};
use crate::protocol::telephony::{outbound_clear, OutboundMark, OutboundMedia, TelephonyInbound};
use crate::sanitize::{deep_merge, sanitize};
use crate::session::Session;

/// Messages accepted by a session actor.
pub enum SessionMessage {
    /// The telephony socket for this call has connected; here's where to send
    /// outbound telephony frames.
    TelephonyConnected(mpsc::Sender<WsMessage>),
    TelephonyFrame(TelephonyInbound),
    TelephonyClosed,

    ModelOpened(mpsc::Sender<ModelMessage>),
    ModelFrame(Value),
    ModelClosed,

    ObserverConnected(Uuid, mpsc::Sender<WsMessage>),
    ObserverDisconnected(Uuid),
    /// A `session.update` (or other client-event) frame sent by an observer.
    ObserverFrame(Value),

    TimerFired(TimerKind),

    FunctionResult { call_id: String, output: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    PendingCommit,
    Reconnect,
}

/// A cheap handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    pub call_sid: String,
    tx: mpsc::Sender<SessionMessage>,
}

impl SessionHandle {
    pub async fn send(&self, msg: SessionMessage) {
        if self.tx.send(msg).await.is_err() {
            debug!(call_sid = %self.call_sid, "session actor gone, dropping message");
        }
    }
}

/// Spawn a new session actor for `call_sid`. Returns a handle producers can push
/// messages through. `shutdown` is cancelled once at process shutdown; the
/// actor force-flushes pending audio and tears down its model socket in response.
/// `on_exit` runs once the actor's message loop ends — `SessionManager`
/// uses it to drop the now-stale map entry so `get_or_create` never hands out a
/// handle to a dead actor.
pub fn spawn(
    call_sid: String,
    config: Arc<BridgeConfig>,
    functions: Arc<FunctionRegistry>,
    shutdown: CancellationToken,
    on_exit: impl FnOnce() + Send + 'static,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(256);
    let handle = SessionHandle { call_sid: call_sid.clone(), tx: tx.clone() };

    let output_audio_format =
        normalize_audio_format(&config.output_audio_format).unwrap_or("audio/pcmu").to_string();
    let session = Session::new(call_sid, output_audio_format);

    tokio::spawn(async move {
        let mut actor = SessionActor {
            session,
            config,
            functions,
            self_tx: tx,
            shutdown,
            telephony_tx: None,
            model_tx: None,
            observers: std::collections::HashMap::new(),
            pending_commit_deadline: None,
            reconnect_deadline: None,
            sample_rate: 8000,
        };
        actor.run(rx).await;
        on_exit();
    });

    handle
}

struct SessionActor {
    session: Session,
    config: Arc<BridgeConfig>,
    functions: Arc<FunctionRegistry>,
    self_tx: mpsc::Sender<SessionMessage>,
    shutdown: CancellationToken,

    telephony_tx: Option<mpsc::Sender<WsMessage>>,
    model_tx: Option<mpsc::Sender<ModelMessage>>,
    observers: std::collections::HashMap<Uuid, mpsc::Sender<WsMessage>>,

    pending_commit_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,
    sample_rate: u64,
}

impl SessionActor {
    async fn run(&mut self, mut rx: mpsc::Receiver<SessionMessage>) {
        loop {
            let next_wake = [self.pending_commit_deadline, self.reconnect_deadline]
                .into_iter()
                .flatten()
                .min();

            let sleep = async {
                match next_wake {
                    Some(instant) => tokio::time::sleep_until(instant).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg).await,
                        None => break,
                    }
                }
                _ = sleep => {
                    self.fire_timers().await;
                }
                _ = self.shutdown.cancelled() => {
                    info!(call_sid = %self.session.call_sid, "shutting down, flushing pending audio");
                    self.on_pending_commit_timer(true).await;
                    self.teardown_model().await;
                    break;
                }
            }

            if self.telephony_tx.is_none() && self.observers.is_empty() {
                // Telephony gone and no observers remain: nothing left to bridge.
                break;
            }
        }
        info!(call_sid = %self.session.call_sid, "session actor exiting");
    }

    async fn fire_timers(&mut self) {
        let now = Instant::now();
        if let Some(deadline) = self.pending_commit_deadline {
            if now >= deadline {
                self.pending_commit_deadline = None;
                self.on_pending_commit_timer(false).await;
            }
        }
        if let Some(deadline) = self.reconnect_deadline {
            if now >= deadline {
                self.reconnect_deadline = None;
                self.connect_model().await;
            }
        }
    }

    async fn handle_message(&mut self, msg: SessionMessage) {
        match msg {
            SessionMessage::TelephonyConnected(tx) => {
                self.telephony_tx = Some(tx);
            }
            SessionMessage::TelephonyFrame(frame) => self.on_telephony_frame(frame).await,
            SessionMessage::TelephonyClosed => self.on_telephony_closed().await,

            SessionMessage::ModelOpened(tx) => self.on_model_opened(tx).await,
            SessionMessage::ModelFrame(raw) => self.on_model_frame(raw).await,
            SessionMessage::ModelClosed => self.on_model_closed().await,

            SessionMessage::ObserverConnected(id, tx) => self.on_observer_connected(id, tx).await,
            SessionMessage::ObserverDisconnected(id) => {
                self.observers.remove(&id);
            }
            SessionMessage::ObserverFrame(raw) => self.on_observer_frame(raw).await,

            SessionMessage::TimerFired(TimerKind::PendingCommit) => {
                self.on_pending_commit_timer(false).await;
            }
            SessionMessage::TimerFired(TimerKind::Reconnect) => self.connect_model().await,

            SessionMessage::FunctionResult { call_id, output } => {
                self.emit_to_model(ClientEvent::function_call_output(call_id, output)).await;
                self.request_response_create(true).await;
            }
        }
    }

    // ---- Telephony leg ----

    async fn on_telephony_frame(&mut self, frame: TelephonyInbound) {
        match frame {
            TelephonyInbound::Start { start } => {
                self.session.reset_for_start(start.stream_sid);
                self.session.call_sid = start.call_sid;
                self.broadcast_call_state("active").await;
                self.connect_model().await;
            }
            TelephonyInbound::Media { media } => {
                if let Some(ts) = media.timestamp.and_then(|t| t.as_u64()) {
                    self.session.latest_media_timestamp_ms = ts;
                }
                let decoded = match BASE64.decode(media.payload.as_bytes()) {
                    Ok(d) => d,
                    Err(_) => return,
                };
                if decoded.is_empty() {
                    // Zero-length payload after decode: nothing to buffer.
                    return;
                }
                if self.model_tx.is_some() {
                    self.emit_to_model(ClientEvent::audio_append(media.payload)).await;
                    self.session.has_buffered_audio = true;
                    self.session.pending_audio_bytes += decoded.len();
                    self.arm_pending_commit();
                }
            }
            TelephonyInbound::Mark { .. } => {}
            TelephonyInbound::Stop { .. } | TelephonyInbound::Close => {
                self.on_telephony_closed().await;
            }
        }
    }

    async fn on_telephony_closed(&mut self) {
        self.on_pending_commit_timer(true).await;
        self.telephony_tx = None;
        self.teardown_model().await;
        self.broadcast_call_state("disconnected").await;
    }

    fn arm_pending_commit(&mut self) {
        self.pending_commit_deadline =
            Some(Instant::now() + Duration::from_millis(self.config.pending_commit_delay_ms));
    }

    async fn on_pending_commit_timer(&mut self, forced: bool) {
        use crate::session::CommitDecision;
        match self.session.should_commit(self.config.min_commit_bytes, forced) {
            CommitDecision::Rearm => self.arm_pending_commit(),
            CommitDecision::Discard => {}
            CommitDecision::Commit => {
                self.emit_to_model(ClientEvent::audio_commit()).await;
                self.session.apply_commit();
                self.request_response_create(false).await;
            }
        }
    }

    // ---- Model leg ----

    async fn connect_model(&mut self) {
        if self.model_tx.is_some() {
            return;
        }
        let model_id = self
            .session
            .saved_config
            .as_ref()
            .and_then(|c| c.get("model"))
            .and_then(Value::as_str)
            .unwrap_or(&self.config.model_id)
            .to_string();
        self.session.active_model = Some(model_id.clone());

        let url = format!("{}?model={}", self.config.model_ws_base, model_id);
        let mut request = match url.into_client_request() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "invalid model websocket url");
                return;
            }
        };
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", self.config.openai_api_key)) {
            request.headers_mut().insert("Authorization", v);
        }
        if !self.config.beta_header.is_empty() {
            if let Ok(v) = HeaderValue::from_str(&self.config.beta_header) {
                request.headers_mut().insert("OpenAI-Beta", v);
            }
        }

        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::connect_async(request).await {
                Ok((ws_stream, _response)) => {
                    let (mut write, mut read) = ws_stream.split();
                    let (out_tx, mut out_rx) = mpsc::channel::<ModelMessage>(256);
                    let _ = self_tx.send(SessionMessage::ModelOpened(out_tx)).await;

                    let writer_task = tokio::spawn(async move {
                        while let Some(msg) = out_rx.recv().await {
                            if write.send(msg).await.is_err() {
                                break;
                            }
                        }
                    });

                    while let Some(msg) = read.next().await {
                        match msg {
                            Ok(ModelMessage::Text(text)) => {
                                if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                    if self_tx.send(SessionMessage::ModelFrame(value)).await.is_err() {
                                        break;
                                    }
                                } else {
                                    debug!("malformed model frame, dropping");
                                }
                            }
                            Ok(ModelMessage::Close(_)) => break,
                            Err(_) => break,
                            _ => {}
                        }
                    }
                    writer_task.abort();
                    let _ = self_tx.send(SessionMessage::ModelClosed).await;
                }
                Err(e) => {
                    warn!(error = %e, "model websocket connect failed");
                    let _ = self_tx.send(SessionMessage::ModelClosed).await;
                }
            }
        });
    }

    async fn on_model_opened(&mut self, tx: mpsc::Sender<ModelMessage>) {
        self.model_tx = Some(tx);
        self.reconnect_deadline = None;

        let default_config = self.config.default_session_config();
        let default_value = serde_json::to_value(&default_config).unwrap_or(Value::Null);
        let mut effective = match &self.session.saved_config {
            Some(saved) => deep_merge(&default_value, saved),
            None => default_value,
        };
        if let Some(obj) = effective.as_object_mut() {
            obj.remove("model");
        }
        let sanitized = sanitize(effective);
        let session_config = serde_json::from_value(sanitized).unwrap_or_default();
        self.emit_to_model(ClientEvent::session_update(session_config)).await;
    }

    async fn on_model_closed(&mut self) {
        self.model_tx = None;
        if self.telephony_tx.is_some() {
            self.broadcast_call_state("model_disconnected").await;
            self.reconnect_deadline =
                Some(Instant::now() + Duration::from_millis(self.config.model_reconnect_delay_ms));
        }
    }

    async fn teardown_model(&mut self) {
        self.model_tx = None;
        self.reconnect_deadline = None;
    }

    async fn on_model_frame(&mut self, raw: Value) {
        // All inbound events are unconditionally broadcast to observers.
        self.broadcast_to_observers(&raw).await;

        let Some(event) = ServerEvent::parse(&raw) else {
            debug!("malformed model frame with no type, dropping");
            return;
        };

        match event {
            ServerEvent::Error { code, .. } => match code.as_deref() {
                Some("input_audio_buffer_commit_empty") => {
                    self.session.apply_commit_empty_error();
                }
                Some("conversation_already_has_active_response") => {
                    self.session.apply_already_has_active_response_error();
                }
                _ => debug!(?code, "model error event"),
            },
            ServerEvent::SpeechStarted { .. } => self.on_barge_in().await,
            ServerEvent::OutputAudioDelta { item_id, delta } => {
                self.on_output_audio_delta(item_id, delta).await;
            }
            ServerEvent::ResponseCreated => self.session.on_response_created(),
            ServerEvent::ResponseDone => {
                let (should_regate, force) = self.session.on_response_done();
                if should_regate {
                    self.request_response_create(force).await;
                }
            }
            ServerEvent::OutputItemDone { item } => {
                if let Some(fc) = FunctionCallItem::from_item(&item) {
                    self.dispatch_function_call(fc).await;
                }
            }
            ServerEvent::Other { event_type } => {
                debug!(event_type, "unknown/undocumented server event, forwarded to observers");
            }
        }
    }

    async fn on_output_audio_delta(&mut self, item_id: String, delta_b64: String) {
        let decoded_len = BASE64.decode(delta_b64.as_bytes()).map(|d| d.len()).unwrap_or(0);
        self.session.on_output_audio_delta(&item_id, decoded_len);

        if let Some(stream_sid) = self.session.stream_sid.clone() {
            self.send_telephony(OutboundMedia::new(&stream_sid, delta_b64)).await;
            self.send_telephony(OutboundMark::new(&stream_sid, format!("assistant_{item_id}"))).await;
        }
    }

    async fn on_barge_in(&mut self) {
        let Some((item_id, audio_end_ms)) = self.session.compute_truncation(self.sample_rate) else {
            return; // no in-flight assistant item to truncate
        };
        self.emit_to_model(ClientEvent::item_truncate(item_id, 0, audio_end_ms)).await;
        if let Some(stream_sid) = self.session.stream_sid.clone() {
            self.send_telephony_value(outbound_clear(&stream_sid)).await;
        }
        self.session.apply_truncation_reset();
    }

    // ---- Response-creation gate ----

    async fn request_response_create(&mut self, force: bool) {
        if self.session.request_response_create(force, self.model_tx.is_some()) {
            self.emit_to_model(ClientEvent::response_create()).await;
        }
    }

    // ---- Function dispatch ----

    async fn dispatch_function_call(&mut self, fc: FunctionCallItem) {
        let functions = self.functions.clone();
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            let output = functions.dispatch(&fc.name, &fc.arguments).await;
            let _ = self_tx.send(SessionMessage::FunctionResult { call_id: fc.call_id, output }).await;
        });
    }

    // ---- Observer fan-out ----

    async fn on_observer_connected(&mut self, id: Uuid, tx: mpsc::Sender<WsMessage>) {
        let hello = observer::relay_hello(now_ms());
        let _ = tx.send(WsMessage::Text(hello.to_string().into())).await;
        self.observers.insert(id, tx);
    }

    async fn on_observer_frame(&mut self, raw: Value) {
        match observer::classify_observer_frame(&raw) {
            ObserverFrameDecision::Forward => self.forward_raw_to_model(raw).await,
            ObserverFrameDecision::Reject(event_type) => {
                warn!(event_type, "dropping unrecognized observer client event");
            }
            ObserverFrameDecision::SessionUpdate(session_payload) => {
                self.apply_observer_session_update(session_payload).await;
            }
        }
    }

    async fn apply_observer_session_update(&mut self, session_payload: Value) {
        let sanitized = sanitize(session_payload);
        let requested_model = sanitized.get("model").and_then(Value::as_str).map(str::to_string);
        self.session.saved_config = Some(sanitized);

        if let Some(model) = requested_model {
            if self.session.active_model.as_deref() != Some(model.as_str()) {
                // Close the model socket exactly once; reconnect picks up the new model.
                self.teardown_model().await;
                self.reconnect_deadline = Some(Instant::now());
                return;
            }
        }

        if self.model_tx.is_some() {
            let mut session_value = self.session.saved_config.clone().unwrap_or(Value::Null);
            if let Some(obj) = session_value.as_object_mut() {
                obj.remove("model");
            }
            let session_config = serde_json::from_value(session_value).unwrap_or_default();
            self.emit_to_model(ClientEvent::session_update(session_config)).await;
        }
    }

    async fn broadcast_to_observers(&mut self, value: &Value) {
        if self.observers.is_empty() {
            return;
        }
        let text = value.to_string();
        let mut dead = Vec::new();
        for (id, tx) in &self.observers {
            // Observer sends are best-effort: drop rather than backpressure.
            if tx.try_send(WsMessage::Text(text.clone().into())).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            self.observers.remove(&id);
        }
    }

    async fn broadcast_call_state(&mut self, state: &str) {
        let event = observer::call_state(&self.session.call_sid, state);
        self.broadcast_to_observers(&event).await;
    }

    // ---- Outbound helpers ----

    async fn emit_to_model(&mut self, event: ClientEvent) {
        if !is_client_event(event.event_type()) {
            warn!(event_type = event.event_type(), "refusing to emit non-registered client event");
            return;
        }
        self.send_model_value(event.to_wire_json()).await;
    }

    async fn forward_raw_to_model(&mut self, raw: Value) {
        self.send_model_value(raw).await;
    }

    async fn send_model_value(&mut self, value: Value) {
        let Some(tx) = &self.model_tx else { return };
        let text = value.to_string();
        if tx.send(ModelMessage::Text(text.into())).await.is_err() {
            self.model_tx = None;
        }
    }

    async fn send_telephony(&mut self, frame: impl serde::Serialize) {
        let value = serde_json::to_value(frame).unwrap_or(Value::Null);
        self.send_telephony_value(value).await;
    }

    async fn send_telephony_value(&mut self, value: Value) {
        let Some(tx) = &self.telephony_tx else { return };
        let text = value.to_string();
        // Telephony sends are backpressured rather than dropped: a full/broken
        // channel tears down the leg instead of silently losing audio.
        if tx.send(WsMessage::Text(text.into())).await.is_err() {
            self.telephony_tx = None;
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
