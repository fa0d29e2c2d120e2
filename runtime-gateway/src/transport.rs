use crate::protocol::{ServerMessage, TelephonyFrame};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

/// A frame read from the caller's transport, already unwrapped from its
/// transport-specific envelope (base64 for browser, raw for telephony).
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Audio(Vec<u8>),
    Control(String),
}

/// Read half of a caller transport, owned by the ingress pump (§4.4).
#[async_trait]
pub trait TransportReader: Send {
    async fn read_frame(&mut self) -> Option<InboundFrame>;
}

/// Write half of a caller transport, owned by the egress pump (§4.4). Closing
/// is idempotent (I-C): a second call after the socket is already closed
/// must not error.
#[async_trait]
pub trait TransportWriter: Send {
    async fn send_audio(&mut self, pcm_s16le: &[u8], ts: i64) -> bool;
    async fn send_event(&mut self, msg: &ServerMessage) -> bool;
    async fn close(&mut self);
}

/// Browser, telephony, and preview connections are all upgraded to a
/// WebSocket by the Session Gateway before being split into these two
/// halves, so neither half needs to know which transport kind it serves
/// (§9 "Polymorphism over transports").
pub struct WsTransportReader {
    stream: SplitStream<WebSocket>,
}

pub struct WsTransportWriter {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

pub fn split_ws(socket: WebSocket) -> (WsTransportReader, WsTransportWriter) {
    let (sink, stream) = socket.split();
    (
        WsTransportReader { stream },
        WsTransportWriter {
            sink,
            closed: false,
        },
    )
}

#[async_trait]
impl TransportReader for WsTransportReader {
    async fn read_frame(&mut self) -> Option<InboundFrame> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(InboundFrame::Control(text)),
                Some(Ok(Message::Binary(bytes))) => return Some(InboundFrame::Audio(bytes)),
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Err(e)) => {
                    debug!(error = %e, "transport read error");
                    return None;
                }
            }
        }
    }
}

#[async_trait]
impl TransportWriter for WsTransportWriter {
    async fn send_audio(&mut self, pcm_s16le: &[u8], ts: i64) -> bool {
        use base64::Engine;
        let data_b64 = base64::engine::general_purpose::STANDARD.encode(pcm_s16le);
        self.send_event(&ServerMessage::audio_chunk(data_b64, ts)).await
    }

    async fn send_event(&mut self, msg: &ServerMessage) -> bool {
        if self.closed {
            return false;
        }
        let Ok(text) = serde_json::to_string(msg) else {
            return false;
        };
        self.sink.send(Message::Text(text)).await.is_ok()
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.sink.close().await;
    }
}

/// Telephony frames wrap audio and control data in a JSON envelope instead
/// of addressing WebSocket text/binary frames directly (§6 "Telephony").
/// These adapt the same raw split halves to the pump-facing traits so the
/// Provider Bridge never needs to know which transport it's driving.
pub struct TelephonyTransportReader {
    stream: SplitStream<WebSocket>,
    stream_sid: String,
}

pub struct TelephonyTransportWriter {
    sink: SplitSink<WebSocket, Message>,
    stream_sid: String,
    closed: bool,
}

pub fn split_telephony_ws(
    socket: WebSocket,
    stream_sid: String,
) -> (TelephonyTransportReader, TelephonyTransportWriter) {
    let (sink, stream) = socket.split();
    (
        TelephonyTransportReader {
            stream,
            stream_sid: stream_sid.clone(),
        },
        TelephonyTransportWriter {
            sink,
            stream_sid,
            closed: false,
        },
    )
}

#[async_trait]
impl TransportReader for TelephonyTransportReader {
    async fn read_frame(&mut self) -> Option<InboundFrame> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<TelephonyFrame>(&text) {
                    Ok(TelephonyFrame::Media { media }) => {
                        match base64::engine::general_purpose::STANDARD.decode(media.payload) {
                            Ok(bytes) => return Some(InboundFrame::Audio(bytes)),
                            Err(e) => {
                                debug!(error = %e, "dropping malformed telephony media frame");
                                continue;
                            }
                        }
                    }
                    Ok(TelephonyFrame::Stop) => return None,
                    Ok(TelephonyFrame::Start { .. }) => continue,
                    Err(e) => {
                        debug!(error = %e, "ignoring unrecognized telephony frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(Message::Binary(_))) | Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    continue
                }
                Some(Err(e)) => {
                    debug!(error = %e, "telephony transport read error");
                    return None;
                }
            }
        }
    }
}

#[async_trait]
impl TransportWriter for TelephonyTransportWriter {
    async fn send_audio(&mut self, pcm_s16le: &[u8], _ts: i64) -> bool {
        if self.closed {
            return false;
        }
        let payload_b64 = base64::engine::general_purpose::STANDARD.encode(pcm_s16le);
        let frame = serde_json::json!({
            "event": "media",
            "streamSid": self.stream_sid,
            "media": { "payload": payload_b64 },
        });
        let Ok(text) = serde_json::to_string(&frame) else {
            return false;
        };
        self.sink.send(Message::Text(text)).await.is_ok()
    }

    /// Telephony carriers don't consume the browser event protocol; every
    /// non-audio server event is dropped rather than forwarded as a frame.
    async fn send_event(&mut self, _msg: &ServerMessage) -> bool {
        true
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.sink.close().await;
    }
}
