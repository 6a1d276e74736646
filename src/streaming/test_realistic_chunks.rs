//! Streams shaped like real backend traffic, cut at awkward points

use super::test_utils::{chunk_str, content_of, controls_of, extract_all, print_units, TestSink};
use super::ControlMessage;
use crate::config::AssemblerConfig;
use crate::conversation::TurnState;
use crate::session::StreamSession;

/// NDJSON of OpenAI-style deltas with a role-only delta and a heartbeat
const DELTA_STREAM: &str = concat!(
    "{\"type\":\"connected\",\"sessionId\":\"sess-42\"}\n",
    "{\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
    "{\"choices\":[{\"delta\":{\"content\":\"Here is\"}}]}\n",
    "{\"choices\":[{\"delta\":{\"content\":\" a list:\\n\\n\"}}]}\n",
    "{\"type\":\"keepalive\"}\n",
    "{\"choices\":[{\"delta\":{\"content\":\"- first item\\n\"}}]}\n",
    "{\"choices\":[{\"delta\":{\"content\":\"- second {item}\\n\\n\"}}]}\n",
    "{\"choices\":[{\"delta\":{\"content\":\"The answer\"}}]}\n",
    "{\"choices\":[{\"delta\":{\"content\":\"is 42.\"}}]}\n",
    "{\"type\":\"completion\",\"reason\":\"stop\"}\n",
);

const DELTA_CONTENT: &str = "Here is a list:\n\n- first item\n- second {item}\n\nThe answer is 42.";

#[test]
fn test_delta_stream_at_odd_chunk_sizes() {
    for size in [1, 2, 3, 7, 13, 29, 64, DELTA_STREAM.len()] {
        let sink = TestSink::new();
        let mut session =
            StreamSession::with_default_renderer(AssemblerConfig::default(), sink.boxed());
        for chunk in chunk_str(DELTA_STREAM, size) {
            session.push_chunk(&chunk).unwrap();
        }
        session.close().unwrap();

        let message = session.last_assistant_message().unwrap();
        assert_eq!(message.content, DELTA_CONTENT, "chunk size {size}");
        assert!(message.frozen);
        assert_eq!(session.turn_state(), TurnState::Finalized);
        assert_eq!(session.session_id(), Some("sess-42"));
        assert_eq!(session.raw_buffer(), "");
        assert_eq!(sink.last_content().as_deref(), Some(DELTA_CONTENT));
    }
}

#[test]
fn test_plain_text_with_heartbeats_mid_sentence() {
    let stream = concat!(
        "Streaming plain",
        "{\"type\":\"keepalive\"}",
        "text with a heartbeat",
        "{\"type\":\"keepalive\"}",
        " in the middle.",
    );

    for size in [1, 4, 9, 17] {
        let units = extract_all(&chunk_str(stream, size));
        if size == 1 {
            print_units(&units);
        }
        assert_eq!(
            content_of(&units),
            "Streaming plain text with a heartbeat in the middle.",
            "chunk size {size}"
        );
        assert!(controls_of(&units).is_empty());
    }
}

#[test]
fn test_mixed_stream_ending_in_error() {
    let stream = concat!(
        "{\"type\":\"connected\"}",
        "Checking the logs",
        "{\"content\":\" now.\"}",
        "{\"type\":\"keepalive\"}",
        "{\"type\":\"error\",\"error\":{\"code\":503}}",
    );

    for size in [1, 5, 11, stream.len()] {
        let units = extract_all(&chunk_str(stream, size));
        assert_eq!(content_of(&units), "Checking the logs now.", "chunk size {size}");

        let controls = controls_of(&units);
        assert_eq!(controls.len(), 2);
        assert_eq!(controls[0], ControlMessage::Connected { session_id: None });
        assert_eq!(
            controls[1].error_text().as_deref(),
            Some(r#"{"code":503}"#)
        );
    }
}
