use runtime_gateway::protocol::{ClientMessage, ServerMessage, TelephonyFrame};

#[test]
fn conversation_init_parses_optional_model() {
    let raw = r#"{"type":"conversation_init","language":"en","model":"gpt-4o-realtime"}"#;
    let msg: ClientMessage = serde_json::from_str(raw).unwrap();
    match msg {
        ClientMessage::ConversationInit { language, model } => {
            assert_eq!(language, "en");
            assert_eq!(model.as_deref(), Some("gpt-4o-realtime"));
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn user_audio_chunk_round_trips_through_the_tagged_enum() {
    let raw = r#"{"type":"user_audio_chunk","data_b64":"Zm9v"}"#;
    let msg: ClientMessage = serde_json::from_str(raw).unwrap();
    assert!(matches!(msg, ClientMessage::UserAudioChunk { data_b64 } if data_b64 == "Zm9v"));
}

#[test]
fn audio_chunk_helper_fills_in_the_fixed_pcm_format() {
    let server_msg = ServerMessage::audio_chunk("abcd".to_string(), 42);
    let json = serde_json::to_value(&server_msg).unwrap();
    assert_eq!(json["type"], "audio_chunk");
    assert_eq!(json["sample_rate"], 16_000);
    assert_eq!(json["channels"], 1);
    assert_eq!(json["format"], "pcm_s16le");
    assert_eq!(json["data_b64"], "abcd");
    assert_eq!(json["ts"], 42);
}

#[test]
fn telephony_start_frame_parses_custom_parameters() {
    let raw = r#"{
        "event": "start",
        "customParameters": {"agent_id": "agent-123", "user_id": "user-9"}
    }"#;
    let frame: TelephonyFrame = serde_json::from_str(raw).unwrap();
    match frame {
        TelephonyFrame::Start { custom_parameters } => {
            assert_eq!(custom_parameters.agent_id, "agent-123");
            assert_eq!(custom_parameters.user_id.as_deref(), Some("user-9"));
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn telephony_media_frame_parses_the_nested_payload_envelope() {
    let raw = r#"{"event": "media", "media": {"payload": "base64data"}}"#;
    let frame: TelephonyFrame = serde_json::from_str(raw).unwrap();
    match frame {
        TelephonyFrame::Media { media } => assert_eq!(media.payload, "base64data"),
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn telephony_stop_frame_has_no_payload() {
    let raw = r#"{"event": "stop"}"#;
    let frame: TelephonyFrame = serde_json::from_str(raw).unwrap();
    assert!(matches!(frame, TelephonyFrame::Stop));
}
