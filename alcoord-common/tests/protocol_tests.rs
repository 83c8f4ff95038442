//! A complete coordination transcript decoded frame by frame

use alcoord_common::protocol::{is_valid_label, MODEL_ENDPOINT};
use alcoord_common::{ClientMessage, Error, ServerMessage};

#[test]
fn test_transcript_decodes_in_order() {
    let client_frames = [
        r#"{"type":"register","project_name":"sst2","model_name":"least","count":0}"#,
        r#"{"type":"scores","precision":0.5,"recall":1.0,"f1":0.6667,"count":0}"#,
        r#"{"type":"utterance","utterance":"a gripping, witty film","count":0,"client_time":0.42,"al_time":0.4,"io_time_start":1700000000.25}"#,
        r#"{"type":"scores","precision":0.75,"recall":1.0,"f1":0.8571,"count":1}"#,
    ];
    let kinds: Vec<&str> = client_frames
        .iter()
        .map(|frame| ClientMessage::decode(frame).unwrap().kind())
        .collect();
    assert_eq!(kinds, vec!["register", "scores", "utterance", "scores"]);

    let server_frames = [
        r#"{"type":"next_utterance","io_time_start":1700000000.25}"#,
        r#"{"type":"annotation","utterance":"a gripping, witty film","annotation":1,"io_time_start":1700000003.5}"#,
        r#"{"type":"finished","cause":"max count: 1 reached"}"#,
    ];
    let decoded: Vec<ServerMessage> = server_frames
        .iter()
        .map(|frame| ServerMessage::decode(frame).unwrap())
        .collect();
    assert!(!decoded[0].is_terminal());
    assert!(!decoded[1].is_terminal());
    assert!(decoded[2].is_terminal());
    assert_eq!(
        decoded[2],
        ServerMessage::Finished {
            cause: "max count: 1 reached".to_string()
        }
    );
}

#[test]
fn test_simulation_utterance_carries_label() {
    let message = ClientMessage::decode(
        r#"{"type":"utterance","utterance":"dull","label":0,"count":3,"client_time":0.1,"al_time":0.05,"io_time_start":12.0}"#,
    )
    .unwrap();
    match message {
        ClientMessage::Utterance { label, count, .. } => {
            assert_eq!(label, Some(0));
            assert_eq!(count, 3);
        }
        other => panic!("expected utterance, got {:?}", other),
    }
}

#[test]
fn test_server_frame_is_not_a_client_frame() {
    let result = ClientMessage::decode(r#"{"type":"finished","cause":"x"}"#);
    assert!(matches!(result, Err(Error::Json(_))));
}

#[test]
fn test_constants() {
    assert_eq!(MODEL_ENDPOINT, "/model");
    assert!(is_valid_label(0));
    assert!(is_valid_label(1));
    assert!(!is_valid_label(2));
    assert!(!is_valid_label(-1));
}
