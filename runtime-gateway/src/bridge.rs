use crate::protocol::{ClientMessage, ServerMessage};
use crate::provider_ws::{ProviderEvent, ProviderReader, ProviderWriter};
use crate::session_vars::SessionVariables;
use crate::tool_dispatch::ToolDispatcher;
use crate::transport::{InboundFrame, TransportReader, TransportWriter};
use runtime_core::model::{KnowledgeItem, Tenant, Tool};
use runtime_core::provider::ToolResultStatus;
use runtime_core::quota::QuotaDimension;
use runtime_core::CancelSignal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, instrument, warn};

/// Why a session's Provider Bridge pump exited (§4.4 termination causes table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    CallerDisconnected,
    ProviderDisconnected,
    EndCallTool,
    QuotaBreached(&'static str),
    ProviderError,
    TransportError,
    SessionReplaced,
}

const END_CALL_GRACE: Duration = Duration::from_secs(5);

/// Everything the ingress/egress pumps need, grouped so `run` doesn't take a
/// dozen positional arguments.
pub struct BridgeContext {
    pub session_id: String,
    pub tools: Vec<Tool>,
    pub knowledge_items: Vec<KnowledgeItem>,
    pub tenant: Tenant,
    pub tool_dispatcher: Arc<ToolDispatcher>,
    pub vars: Arc<SessionVariables>,
    pub cancel: CancelSignal,
    /// Notified if C1 displaces this session's slot in the active-session map.
    pub replaced: Arc<Notify>,
    /// §5 "Provider WebSocket idle: detected by absence of any frame for 60s".
    pub provider_idle_timeout: Duration,
}

/// Drives one session's full-duplex bridge between a caller transport and
/// the provider connection until either side closes, a tool ends the call,
/// the session is displaced, or the quota meter cuts it off.
#[instrument(skip_all, fields(session_id = %ctx.session_id))]
pub async fn run(
    ctx: BridgeContext,
    transport_reader: Box<dyn TransportReader>,
    transport_writer: Box<dyn TransportWriter>,
    provider_reader: ProviderReader,
    provider_writer: ProviderWriter,
    meter: Option<tokio::task::JoinHandle<Option<QuotaDimension>>>,
) -> TerminationCause {
    let provider_writer = Arc::new(Mutex::new(provider_writer));
    let transport_writer = Arc::new(Mutex::new(transport_writer));

    let (cause_tx, mut cause_rx) = mpsc::channel::<TerminationCause>(4);

    let ingress = tokio::spawn(run_ingress(
        transport_reader,
        provider_writer.clone(),
        transport_writer.clone(),
        ctx.cancel.clone(),
        cause_tx.clone(),
    ));

    let egress = tokio::spawn(run_egress(
        provider_reader,
        transport_writer.clone(),
        provider_writer.clone(),
        ctx.tools.clone(),
        ctx.knowledge_items.clone(),
        ctx.tenant.clone(),
        ctx.tool_dispatcher.clone(),
        ctx.vars.clone(),
        ctx.session_id.clone(),
        ctx.cancel.clone(),
        cause_tx.clone(),
        ctx.provider_idle_timeout,
    ));

    let cause = tokio::select! {
        _ = ctx.replaced.notified() => {
            TerminationCause::SessionReplaced
        }
        Some(dim) = async {
            match meter {
                Some(handle) => handle.await.ok().flatten(),
                None => std::future::pending().await,
            }
        } => {
            TerminationCause::QuotaBreached(dim.reason_code())
        }
        Some(c) = cause_rx.recv() => c,
    };

    // Delay cancellation so an end_call tool result doesn't cut the agent
    // off mid-sentence: the pumps keep relaying provider audio during the
    // grace window, and only then are told to stop (§4.4, §4.5 #1).
    if cause == TerminationCause::EndCallTool {
        tokio::time::sleep(END_CALL_GRACE).await;
    }
    ctx.cancel.cancel();

    {
        let mut w = transport_writer.lock().await;
        if cause == TerminationCause::SessionReplaced {
            w.send_event(&ServerMessage::SessionReplaced).await;
        }
        w.close().await;
    }
    provider_writer.lock().await.close().await;

    let _ = ingress.await;
    let _ = egress.await;

    info!(?cause, "session bridge terminated");
    cause
}

async fn run_ingress(
    mut reader: Box<dyn TransportReader>,
    provider_writer: Arc<Mutex<ProviderWriter>>,
    transport_writer: Arc<Mutex<Box<dyn TransportWriter>>>,
    cancel: CancelSignal,
    cause_tx: mpsc::Sender<TerminationCause>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            frame = reader.read_frame() => {
                match frame {
                    Some(InboundFrame::Audio(bytes)) => {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let mut w = provider_writer.lock().await;
                        if w.send_audio(&bytes).await.is_err() {
                            let _ = cause_tx.send(TerminationCause::TransportError).await;
                            return;
                        }
                    }
                    Some(InboundFrame::Control(text)) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::End) => {
                                let _ = cause_tx.send(TerminationCause::CallerDisconnected).await;
                                return;
                            }
                            Ok(ClientMessage::ConversationInit { language, model }) => {
                                // Mid-call language/model change: a contextual update to the
                                // already-open provider connection, not a fresh handshake.
                                let model_for_provider = model.clone().unwrap_or_default();
                                let mut pw = provider_writer.lock().await;
                                if pw.send_contextual_update(&language, &model_for_provider).await.is_err() {
                                    let _ = cause_tx.send(TerminationCause::TransportError).await;
                                    return;
                                }
                                drop(pw);
                                transport_writer.lock().await
                                    .send_event(&ServerMessage::LanguageConfirmed { language, model }).await;
                            }
                            Ok(ClientMessage::UserAudioChunk { data_b64 }) => {
                                use base64::Engine;
                                match base64::engine::general_purpose::STANDARD.decode(data_b64) {
                                    Ok(bytes) => {
                                        let mut w = provider_writer.lock().await;
                                        if w.send_audio(&bytes).await.is_err() {
                                            let _ = cause_tx.send(TerminationCause::TransportError).await;
                                            return;
                                        }
                                    }
                                    Err(_) => {
                                        debug!("dropping user_audio_chunk with invalid base64 payload");
                                    }
                                }
                            }
                            Err(_) => {
                                debug!(%text, "ignoring unrecognized control frame");
                            }
                        }
                    }
                    None => {
                        let _ = cause_tx.send(TerminationCause::CallerDisconnected).await;
                        return;
                    }
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_egress(
    mut reader: ProviderReader,
    transport_writer: Arc<Mutex<Box<dyn TransportWriter>>>,
    provider_writer: Arc<Mutex<ProviderWriter>>,
    tools: Vec<Tool>,
    knowledge_items: Vec<KnowledgeItem>,
    tenant: Tenant,
    dispatcher: Arc<ToolDispatcher>,
    vars: Arc<SessionVariables>,
    session_id: String,
    cancel: CancelSignal,
    cause_tx: mpsc::Sender<TerminationCause>,
    idle_timeout: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            timed_out = tokio::time::timeout(idle_timeout, reader.recv_event()) => {
            let event = match timed_out {
                Ok(event) => event,
                Err(_) => {
                    warn!(?idle_timeout, "no provider frame within idle timeout, treating as disconnect");
                    let _ = cause_tx.send(TerminationCause::ProviderDisconnected).await;
                    return;
                }
            };
                match event {
                    Some(ProviderEvent::Audio(bytes)) => {
                        let ts = chrono::Utc::now().timestamp_millis();
                        let mut w = transport_writer.lock().await;
                        if !w.send_audio(&bytes, ts).await {
                            let _ = cause_tx.send(TerminationCause::TransportError).await;
                            return;
                        }
                    }
                    Some(ProviderEvent::AgentResponse { text }) => {
                        let ts = chrono::Utc::now().timestamp_millis();
                        transport_writer.lock().await
                            .send_event(&ServerMessage::AgentResponse { text, ts }).await;
                    }
                    Some(ProviderEvent::UserTranscript { text }) => {
                        let ts = chrono::Utc::now().timestamp_millis();
                        transport_writer.lock().await
                            .send_event(&ServerMessage::UserTranscript { text, ts }).await;
                    }
                    Some(ProviderEvent::LatencyMeasurement { latency_ms }) => {
                        let ts = chrono::Utc::now().timestamp_millis();
                        transport_writer.lock().await
                            .send_event(&ServerMessage::LatencyMeasurement { latency_ms, ts }).await;
                    }
                    Some(ProviderEvent::ToolCall(call)) => {
                        if call.tool_name == "end_call" {
                            let _ = cause_tx.send(TerminationCause::EndCallTool).await;
                        }
                        let result = dispatcher
                            .dispatch(&call, &tools, &knowledge_items, &vars, &session_id, &tenant)
                            .await;
                        let is_error = result.status == ToolResultStatus::Error;
                        if provider_writer.lock().await.send_tool_result(&result).await.is_err() {
                            warn!("failed to send tool result back to provider");
                        }
                        if is_error {
                            // agent continues regardless (§4.5)
                            continue;
                        }
                    }
                    Some(ProviderEvent::EndOfTurn) => continue,
                    Some(ProviderEvent::ProviderError(_)) => {
                        let _ = cause_tx.send(TerminationCause::ProviderError).await;
                        return;
                    }
                    None => {
                        let _ = cause_tx.send(TerminationCause::ProviderDisconnected).await;
                        return;
                    }
                }
            }
        }
    }
}
