use crate::bridge::{self, BridgeContext, TerminationCause};
use crate::protocol::{ClientMessage, PolicyViolationReason, ServerMessage, TelephonyFrame};
use crate::provider_ws::open_provider_connection;
use crate::reconciler::Reconciler;
use crate::session_vars::SessionVariables;
use crate::tool_dispatch::ToolDispatcher;
use crate::transport::{split_telephony_ws, split_ws, TransportReader, TransportWriter};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use runtime_core::provider::ProviderClient;
use runtime_core::repo::ReconciliationJob;
use runtime_core::resolver::{AgentLookup, AgentResolver, AgentSnapshot};
use runtime_core::{
    new_session_id, CancelSignal, Repos, RuntimeConfig, RuntimeError, RuntimeMetrics,
};
use runtime_core::model::{SessionRecord, SessionStatus, TransportKind};
use runtime_core::quota::QuotaEnforcer;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, instrument, warn};

/// Shared state handed to every axum handler, the Session Gateway's view of
/// the whole runtime (§4.1).
pub struct AppState {
    pub repos: Arc<Repos>,
    pub resolver: Arc<AgentResolver>,
    pub quota: Arc<QuotaEnforcer>,
    pub provider: Arc<dyn ProviderClient>,
    pub tool_dispatcher: Arc<ToolDispatcher>,
    pub reconciler: Arc<Reconciler>,
    pub metrics: Arc<RuntimeMetrics>,
    pub config: Arc<RuntimeConfig>,
}

const CONVERSATION_INIT_TIMEOUT: Duration = Duration::from_secs(10);
const TELEPHONY_START_TIMEOUT: Duration = Duration::from_secs(10);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/live/health", get(health))
        .route("/live/ws/:public_dynamic_id", get(browser_ws))
        .route("/live/preview/:public_dynamic_id", get(preview_ws))
        .route("/live/telephony/ws", get(telephony_ws))
        .route("/live/telephony/voice/:public_dynamic_id", post(telephony_voice_webhook))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// §9 supplemented feature: a liveness endpoint for load balancers and
/// orchestrators, reporting active session count alongside plain status.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "active_sessions": state.repos.sessions.active.len(),
    }))
}

async fn browser_ws(
    State(state): State<Arc<AppState>>,
    Path(public_dynamic_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let snapshot = match state
        .resolver
        .resolve(AgentLookup::PublicDynamicId(&public_dynamic_id))
    {
        Ok(s) => s,
        Err(e) => return refusal_response(&e),
    };

    if let Err(reason) = check_origin_allowed(&snapshot, &headers) {
        return policy_violation_response(reason);
    }

    if let Err(e) = state.quota.admit(&snapshot) {
        return refusal_response(&e);
    }

    let user_id = params.get("user_id").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| async move {
        run_browser_session(state, snapshot, socket, TransportKind::Browser, user_id).await;
    })
}

/// Preview transport (§9 supplemented feature): identical admission path to
/// the browser route but tagged with a distinct transport kind so it never
/// contends with a tenant's live caller traffic in analytics.
async fn preview_ws(
    State(state): State<Arc<AppState>>,
    Path(public_dynamic_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let snapshot = match state
        .resolver
        .resolve(AgentLookup::PublicDynamicId(&public_dynamic_id))
    {
        Ok(s) => s,
        Err(e) => return refusal_response(&e),
    };
    if let Err(e) = state.quota.admit(&snapshot) {
        return refusal_response(&e);
    }
    let user_id = params.get("user_id").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| async move {
        run_browser_session(state, snapshot, socket, TransportKind::Preview, user_id).await;
    })
}

fn check_origin_allowed(
    snapshot: &AgentSnapshot,
    headers: &HeaderMap,
) -> Result<(), PolicyViolationReason> {
    if snapshot.tenant.approved_domains.is_empty() {
        return Ok(());
    }
    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let allowed = snapshot
        .tenant
        .approved_domains
        .iter()
        .any(|domain| origin.ends_with(domain.as_str()));
    if allowed {
        Ok(())
    } else {
        Err(PolicyViolationReason::DomainNotApproved)
    }
}

fn refusal_response(err: &RuntimeError) -> Response {
    let reason = match err {
        RuntimeError::NotFound(_) => PolicyViolationReason::UnknownAgent,
        RuntimeError::AdmissionRefused(_) => PolicyViolationReason::AgentDisabled,
        RuntimeError::QuotaExhausted(_) => PolicyViolationReason::QuotaExhausted,
        RuntimeError::ProviderUnreachable(_) => PolicyViolationReason::ProviderUnreachable,
        _ => PolicyViolationReason::UnknownAgent,
    };
    policy_violation_response(reason)
}

fn policy_violation_response(reason: PolicyViolationReason) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": reason.as_str() })),
    )
        .into_response()
}

#[instrument(skip_all, fields(agent_id = %snapshot.agent.id, transport = ?transport_kind))]
async fn run_browser_session(
    state: Arc<AppState>,
    mut snapshot: AgentSnapshot,
    socket: WebSocket,
    transport_kind: TransportKind,
    user_id: String,
) {
    let (mut reader, mut writer) = split_ws(socket);

    let init = tokio::time::timeout(CONVERSATION_INIT_TIMEOUT, read_conversation_init(&mut reader)).await;
    let Ok(Some((language, model))) = init else {
        writer.close().await;
        return;
    };
    snapshot = state
        .resolver
        .apply_conversation_init(snapshot, &language, model.as_deref());

    writer
        .send_event(&ServerMessage::LanguageConfirmed {
            language: snapshot.agent.language.clone(),
            model: Some(snapshot.agent.tts_model_id.clone()),
        })
        .await;
    writer.send_event(&ServerMessage::ConversationReady).await;

    run_session(
        state,
        snapshot,
        Box::new(reader),
        Box::new(writer),
        transport_kind,
        user_id,
    )
    .await;
}

async fn read_conversation_init(
    reader: &mut crate::transport::WsTransportReader,
) -> Option<(String, Option<String>)> {
    loop {
        match reader.read_frame().await? {
            crate::transport::InboundFrame::Control(text) => {
                if let Ok(ClientMessage::ConversationInit { language, model }) =
                    serde_json::from_str::<ClientMessage>(&text)
                {
                    return Some((language, model));
                }
            }
            crate::transport::InboundFrame::Audio(_) => continue,
        }
    }
}

/// Telephony voice-URL webhook (§4.1 "Telephony webhook (voice URL)"): the
/// telephony provider POSTs here when a call arrives, and we hand back a
/// small instruction document — a TwiML `<Connect><Stream>` verb — that
/// tells it to open a WebSocket to `telephony_ws` with the agent id and
/// caller id carried as custom parameters. We only resolve the agent here to
/// fail fast on an unknown id; admission and quota are re-checked when the
/// WebSocket itself connects, since that's the handshake §4.1 specifies as
/// authoritative.
async fn telephony_voice_webhook(
    State(state): State<Arc<AppState>>,
    Path(public_dynamic_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let agent = match state.resolver.resolve(AgentLookup::PublicDynamicId(&public_dynamic_id)) {
        Ok(snapshot) => snapshot.agent,
        Err(e) => return refusal_response(&e),
    };
    let user_id = params
        .get("From")
        .or_else(|| params.get("user_id"))
        .cloned()
        .unwrap_or_default();

    let stream_url = format!("{}/live/telephony/ws", state.config.telephony_websocket_base_url);
    let twiml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{stream_url}">
      <Parameter name="agent_id" value="{agent_id}" />
      <Parameter name="user_id" value="{user_id}" />
    </Stream>
  </Connect>
</Response>"#,
        agent_id = xml_escape(&agent.id),
        user_id = xml_escape(&user_id),
    );

    (
        StatusCode::OK,
        [("content-type", "text/xml")],
        twiml,
    )
        .into_response()
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn telephony_ws(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        run_telephony_session(state, socket).await;
    })
}

async fn run_telephony_session(state: Arc<AppState>, mut socket: WebSocket) {
    let start = tokio::time::timeout(TELEPHONY_START_TIMEOUT, read_telephony_start(&mut socket)).await;
    let Ok(Some((stream_sid, agent_id, user_id))) = start else {
        let _ = socket.close().await;
        return;
    };

    let snapshot = match state.resolver.resolve(AgentLookup::InternalId(&agent_id)) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "telephony session refused at admission");
            let _ = socket.close().await;
            return;
        }
    };
    if let Err(e) = state.quota.admit(&snapshot) {
        warn!(error = %e, "telephony session refused by quota");
        let _ = socket.close().await;
        return;
    }

    let (reader, writer) = split_telephony_ws(socket, stream_sid);
    run_session(
        state,
        snapshot,
        Box::new(reader),
        Box::new(writer),
        TransportKind::TelephonyInbound,
        user_id,
    )
    .await;
}

async fn read_telephony_start(socket: &mut WebSocket) -> Option<(String, String, String)> {
    loop {
        match socket.recv().await? {
            Ok(Message::Text(text)) => match serde_json::from_str::<TelephonyFrame>(&text) {
                Ok(TelephonyFrame::Start { custom_parameters }) => {
                    let stream_sid = serde_json::from_str::<serde_json::Value>(&text)
                        .ok()
                        .and_then(|v| v.get("streamSid").and_then(|s| s.as_str().map(str::to_string)))
                        .unwrap_or_default();
                    return Some((
                        stream_sid,
                        custom_parameters.agent_id,
                        custom_parameters.user_id.unwrap_or_default(),
                    ));
                }
                _ => continue,
            },
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Everything after admission and (for browser/preview) the init handshake:
/// acquire the active-session slot, open the provider connection, run the
/// bridge, then finalize (§4.1 step 5 onward, §4.4, §4.6).
async fn run_session(
    state: Arc<AppState>,
    snapshot: AgentSnapshot,
    transport_reader: Box<dyn TransportReader>,
    transport_writer: Box<dyn TransportWriter>,
    transport_kind: TransportKind,
    user_id: String,
) {
    let session_id = new_session_id();
    let public_dynamic_id = snapshot.agent.public_dynamic_id.clone();
    let agent_id = snapshot.agent.id.clone();
    let tenant_id = snapshot.tenant.id.clone();
    let start_time_unix = chrono::Utc::now().timestamp();

    let displaced = state
        .repos
        .sessions
        .active
        .acquire(&public_dynamic_id, &session_id);
    let replaced = match displaced {
        Some(prev_notify) => {
            // The displaced holder is woken by the Notify installed for its own
            // slot; our own slot now carries a fresh Notify for whoever comes next.
            drop(prev_notify);
            Arc::new(tokio::sync::Notify::new())
        }
        None => Arc::new(tokio::sync::Notify::new()),
    };

    let record = SessionRecord {
        id: session_id.clone(),
        agent_id: agent_id.clone(),
        tenant_id: tenant_id.clone(),
        transport: transport_kind,
        language: snapshot.agent.language.clone(),
        model_id: snapshot.agent.tts_model_id.clone(),
        start_time_unix,
        end_time_unix: None,
        status: SessionStatus::Active,
        provider_conversation_id: None,
        tokens_consumed: 0,
        cost: None,
        termination_cause: None,
        language_model_correction: snapshot.correction.as_ref().map(|c| {
            format!(
                "requested {}/{} -> effective {}",
                c.requested_language, c.requested_model, c.effective_model
            )
        }),
    };
    if let Err(e) = state.repos.sessions.create(record) {
        warn!(error = %e, "failed to persist session record; aborting admission");
        state.repos.sessions.active.release(&public_dynamic_id, &session_id);
        return;
    }

    let provider_agent_id = match &snapshot.agent.provider_agent_id {
        Some(id) => id.clone(),
        None => {
            warn!("agent has no provider_agent_id configured");
            finalize(&state, &session_id, &public_dynamic_id, "missing_provider_agent_id").await;
            return;
        }
    };

    let signed_url = match state.provider.get_signed_url(&provider_agent_id).await {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "provider unreachable at admission");
            finalize(&state, &session_id, &public_dynamic_id, "provider_unreachable").await;
            return;
        }
    };

    let dynamic_variables = AgentResolver::merged_dynamic_variables(
        &snapshot,
        &session_id,
        &user_id,
        &public_dynamic_id,
        start_time_unix,
        transport_kind_label(transport_kind),
    );

    let (provider_reader, provider_writer) = match open_provider_connection(
        &signed_url,
        &snapshot.agent.language,
        &snapshot.agent.tts_model_id,
        &snapshot.voice.provider_voice_id,
        dynamic_variables,
    )
    .await
    {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "failed to open provider connection");
            finalize(&state, &session_id, &public_dynamic_id, "provider_unreachable").await;
            return;
        }
    };

    state.metrics.record_admitted(transport_kind_label(transport_kind));

    let cancel = CancelSignal::new();
    let meter = Some(tokio::spawn(state.quota.clone().run_meter(
        session_id.clone(),
        agent_id.clone(),
        tenant_id.clone(),
        snapshot.agent.per_call_token_cap,
        cancel.clone(),
    )));

    let vars = Arc::new(SessionVariables::new(HashMap::new()));
    let ctx = BridgeContext {
        session_id: session_id.clone(),
        tools: snapshot.tools.clone(),
        knowledge_items: snapshot.knowledge_items.clone(),
        tenant: snapshot.tenant.clone(),
        tool_dispatcher: state.tool_dispatcher.clone(),
        vars,
        cancel,
        replaced: replaced.clone(),
        provider_idle_timeout: Duration::from_secs(state.config.provider_idle_timeout_seconds),
    };

    let cause = bridge::run(
        ctx,
        transport_reader,
        transport_writer,
        provider_reader,
        provider_writer,
        meter,
    )
    .await;

    state.metrics.record_ended();
    state
        .repos
        .sessions
        .active
        .release(&public_dynamic_id, &session_id);

    let end_time_unix = chrono::Utc::now().timestamp();
    let terminal_status = terminal_status_for(&cause);
    let _ = state.repos.sessions.mutate(&session_id, |s| {
        s.end_time_unix = Some(end_time_unix);
        s.termination_cause = Some(format!("{cause:?}"));
        if let Some(status) = terminal_status {
            s.status = status;
        }
    });

    if !matches!(cause, TerminationCause::SessionReplaced) {
        let _ = state.reconciler.enqueue(ReconciliationJob {
            session_id: session_id.clone(),
            provider_agent_id,
            start_time_unix,
            end_time_unix,
            tentative_provider_conversation_id: None,
            attempts: 0,
        }).await;
    }

    info!(session_id = %session_id, ?cause, "session finalized");
}

fn terminal_status_for(cause: &TerminationCause) -> Option<SessionStatus> {
    match cause {
        TerminationCause::QuotaBreached(_) => Some(SessionStatus::AbortedQuota),
        TerminationCause::ProviderError | TerminationCause::TransportError => {
            Some(SessionStatus::AbortedError)
        }
        TerminationCause::SessionReplaced
        | TerminationCause::CallerDisconnected
        | TerminationCause::ProviderDisconnected
        | TerminationCause::EndCallTool => Some(SessionStatus::Completed),
    }
}

async fn finalize(
    state: &Arc<AppState>,
    session_id: &str,
    public_dynamic_id: &str,
    reason: &'static str,
) {
    let end_time_unix = chrono::Utc::now().timestamp();
    let _ = state.repos.sessions.mutate(session_id, |s| {
        s.end_time_unix = Some(end_time_unix);
        s.status = SessionStatus::AbortedError;
        s.termination_cause = Some(reason.to_string());
    });
    state.repos.sessions.active.release(public_dynamic_id, session_id);
}

fn transport_kind_label(kind: TransportKind) -> &'static str {
    match kind {
        TransportKind::Browser => "browser",
        TransportKind::TelephonyInbound => "telephony_inbound",
        TransportKind::TelephonyOutbound => "telephony_outbound",
        TransportKind::Preview => "preview",
    }
}
