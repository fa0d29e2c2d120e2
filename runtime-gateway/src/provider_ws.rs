use crate::error::{GatewayError, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use runtime_core::provider::{
    AgentConfigOverride, ConversationConfigOverride, ConversationInitPayload, ExtraBody,
    ToolCallEvent, ToolResultFrame,
};
use serde_json::Value;
use std::collections::HashMap;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// An event surfaced by the provider during a live session (§4.4 egress pump,
/// §6 "bidirectional audio and event frames").
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Audio(Vec<u8>),
    AgentResponse { text: String },
    UserTranscript { text: String },
    LatencyMeasurement { latency_ms: u64 },
    ToolCall(ToolCallEvent),
    EndOfTurn,
    ProviderError(String),
}

/// Write half of the provider connection, owned by the ingress pump: caller
/// audio and tool results flow out through here.
pub struct ProviderWriter {
    sink: SplitSink<WsStream, Message>,
}

/// Read half of the provider connection, owned by the egress pump.
pub struct ProviderReader {
    stream: SplitStream<WsStream>,
}

/// Opens the provider's realtime WebSocket against a signed URL and sends
/// the single initiation payload, then splits into read/write halves so the
/// ingress and egress pumps can run concurrently (§4.4).
pub async fn open_provider_connection(
    signed_url: &str,
    language: &str,
    model: &str,
    voice_id: &str,
    dynamic_variables: HashMap<String, String>,
) -> Result<(ProviderReader, ProviderWriter)> {
    let (stream, _resp) = connect_async(signed_url).await.map_err(|e| {
        GatewayError::Runtime(runtime_core::RuntimeError::ProviderUnreachable(
            e.to_string(),
        ))
    })?;
    let (sink, stream) = stream.split();
    let mut writer = ProviderWriter { sink };

    let payload = ConversationInitPayload {
        conversation_config_override: ConversationConfigOverride {
            agent: AgentConfigOverride {
                language: language.to_string(),
            },
        },
        extra_body: ExtraBody {
            model: model.to_string(),
            voice_id: voice_id.to_string(),
        },
        dynamic_variables,
    };
    writer.send_json(&payload).await?;

    Ok((ProviderReader { stream }, writer))
}

impl ProviderWriter {
    async fn send_json<T: serde::Serialize>(&mut self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|e| GatewayError::Runtime(runtime_core::RuntimeError::Serialization(e)))?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    pub async fn send_audio(&mut self, pcm_s16le: &[u8]) -> Result<()> {
        self.sink
            .send(Message::Binary(pcm_s16le.to_vec()))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    /// A second `conversation_init`-equivalent mid-call message: a contextual
    /// update rather than a reopened bridge (supplements spec.md §4.2 with
    /// the original's live language/model change path).
    pub async fn send_contextual_update(&mut self, language: &str, model: &str) -> Result<()> {
        let payload = serde_json::json!({
            "type": "contextual_update",
            "agent": { "language": language },
            "extra_body": { "model": model },
        });
        self.send_json(&payload).await
    }

    pub async fn send_tool_result(&mut self, frame: &ToolResultFrame) -> Result<()> {
        self.send_json(frame).await
    }

    pub async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

impl ProviderReader {
    /// Reads the next provider frame, classifying it into a `ProviderEvent`.
    /// Returns `None` on clean close; transcript and audio events are not
    /// globally ordered with respect to one another (§5).
    pub async fn recv_event(&mut self) -> Option<ProviderEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(bytes))) => return Some(ProviderEvent::Audio(bytes)),
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_event_frame(&text) {
                        return Some(event);
                    }
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(Message::Ping(_)))
                | Some(Ok(Message::Pong(_)))
                | Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "provider websocket read error");
                    return Some(ProviderEvent::ProviderError(e.to_string()));
                }
            }
        }
    }
}

fn parse_event_frame(text: &str) -> Option<ProviderEvent> {
    let value: Value = serde_json::from_str(text).ok()?;
    let kind = value.get("type")?.as_str()?;
    match kind {
        "agent_response" => Some(ProviderEvent::AgentResponse {
            text: value.get("text")?.as_str()?.to_string(),
        }),
        "user_transcript" => Some(ProviderEvent::UserTranscript {
            text: value.get("text")?.as_str()?.to_string(),
        }),
        "latency_measurement" => Some(ProviderEvent::LatencyMeasurement {
            latency_ms: value.get("latency_ms")?.as_u64()?,
        }),
        "client_tool_call" | "tool_call" => {
            let tool_name = value.get("tool_name")?.as_str()?.to_string();
            let arguments = value.get("arguments").cloned().unwrap_or(Value::Null);
            let correlation_token = value.get("tool_call_id")?.as_str()?.to_string();
            Some(ProviderEvent::ToolCall(ToolCallEvent {
                tool_name,
                arguments,
                correlation_token,
            }))
        }
        "end_of_turn" => Some(ProviderEvent::EndOfTurn),
        "error" => Some(ProviderEvent::ProviderError(
            value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("provider error")
                .to_string(),
        )),
        other => {
            debug!(kind = other, "ignoring unrecognized provider frame");
            None
        }
    }
}
