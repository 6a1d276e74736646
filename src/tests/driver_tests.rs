use crate::config::AssemblerConfig;
use crate::conversation::TurnState;
use crate::driver::drive_session;
use crate::error::StreamError;
use crate::recording::{
    ChunkSource, PlaybackChunkStream, ReaderChunkStream, RecordedChunk, RecordedStream,
    StreamRecorder,
};
use crate::session::StreamSession;
use crate::streaming::test_utils::{SinkEvent, TestSink};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::time::Duration;

fn recorded(chunks: &[&str]) -> RecordedStream {
    RecordedStream {
        session_id: None,
        recorded_at: Utc::now(),
        chunks: chunks
            .iter()
            .enumerate()
            .map(|(i, data)| RecordedChunk {
                data: data.to_string(),
                timestamp_ms: i as u64 * 2,
            })
            .collect(),
    }
}

fn new_session() -> (StreamSession, TestSink) {
    let sink = TestSink::new();
    let session = StreamSession::with_default_renderer(AssemblerConfig::default(), sink.boxed());
    (session, sink)
}

/// Yields its chunks, then either stalls forever or fails
struct ScriptedSource {
    chunks: VecDeque<Vec<u8>>,
    then_fail: bool,
}

#[async_trait]
impl ChunkSource for ScriptedSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        if self.then_fail {
            anyhow::bail!("connection reset by peer");
        }
        std::future::pending::<()>().await;
        Ok(None)
    }
}

#[tokio::test]
async fn test_playback_drives_turn_to_completion() {
    let (mut session, _) = new_session();
    let mut source = PlaybackChunkStream::new(
        recorded(&[
            r#"{"type":"connected","sessionId":"rec-1"}"#,
            r#"{"content":"Replayed "}"#,
            r#"{"content":"answer."}"#,
            r#"{"type":"completion","reason":"stop"}"#,
        ]),
        true,
    );

    let outcome = drive_session(&mut session, &mut source, Some(Duration::from_secs(5)), None).await;

    assert_eq!(outcome, None);
    assert_eq!(session.session_id(), Some("rec-1"));
    assert_eq!(session.turn_state(), TurnState::Finalized);
    assert_eq!(
        session.last_assistant_message().unwrap().content,
        "Replayed answer."
    );
}

#[tokio::test]
async fn test_exhausted_source_finalizes_partial_turn() {
    let (mut session, sink) = new_session();
    let mut source = ReaderChunkStream::with_block_size(&b"no completion signal here"[..], 4);

    let outcome = drive_session(&mut session, &mut source, None, None).await;

    assert_eq!(outcome, None);
    assert_eq!(session.turn_state(), TurnState::Finalized);
    assert_eq!(
        sink.last_content().as_deref(),
        Some("no completion signal here")
    );
}

#[tokio::test]
async fn test_idle_timeout_finalizes_turn_and_keeps_text() {
    let (mut session, sink) = new_session();
    let mut source = ScriptedSource {
        chunks: VecDeque::from(vec![b"Waiting for the rest".to_vec()]),
        then_fail: false,
    };

    let outcome = drive_session(
        &mut session,
        &mut source,
        Some(Duration::from_millis(50)),
        None,
    )
    .await;

    assert_eq!(outcome, Some(StreamError::IdleTimeout { seconds: 0 }));
    assert_eq!(session.turn_state(), TurnState::Finalized);
    assert!(!session.streaming_active());
    let message = session.last_assistant_message().unwrap();
    assert_eq!(message.content, "Waiting for the rest");
    assert!(message.frozen);
    assert!(sink.failures().is_empty());
    assert_eq!(
        sink.events().last(),
        Some(&SinkEvent::Finished(Some("Waiting for the rest".to_string())))
    );
}

#[tokio::test]
async fn test_source_error_becomes_transport_closed() {
    let (mut session, _) = new_session();
    let mut source = ScriptedSource {
        chunks: VecDeque::from(vec![br#"{"content":"Before the drop"}"#.to_vec()]),
        then_fail: true,
    };

    let outcome = drive_session(&mut session, &mut source, None, None).await;

    match outcome {
        Some(StreamError::TransportClosed { reason }) => {
            assert!(reason.contains("connection reset"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(session.turn_state(), TurnState::Finalized);
    assert_eq!(
        session.last_assistant_message().unwrap().content,
        "Before the drop"
    );
}

#[tokio::test]
async fn test_error_unit_stops_reading() {
    let (mut session, _) = new_session();
    let mut source = ScriptedSource {
        chunks: VecDeque::from(vec![
            b"Partial answer ".to_vec(),
            br#"{"type":"error","message":"boom"}"#.to_vec(),
            br#"{"content":"never read"}"#.to_vec(),
        ]),
        then_fail: false,
    };

    let outcome = drive_session(&mut session, &mut source, None, None).await;

    assert_eq!(
        outcome,
        Some(StreamError::Server {
            message: "boom".to_string()
        })
    );
    assert_eq!(source.chunks.len(), 1);
    assert_eq!(session.turn_state(), TurnState::Finalized);
    assert_eq!(
        session.last_assistant_message().unwrap().content,
        "Partial answer "
    );
}

#[tokio::test]
async fn test_content_after_error_in_same_chunk_is_dropped() {
    let (mut session, sink) = new_session();
    let mut source = ScriptedSource {
        chunks: VecDeque::from(vec![
            br#"Partial {"type":"error","message":"boom"}{"content":"late"}"#.to_vec(),
        ]),
        then_fail: false,
    };

    let outcome = drive_session(&mut session, &mut source, None, None).await;

    assert_eq!(
        outcome,
        Some(StreamError::Server {
            message: "boom".to_string()
        })
    );
    assert!(!session.streaming_active());
    assert_eq!(session.turn_state(), TurnState::Finalized);
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].content, "Partial ");
    assert_eq!(session.raw_buffer(), "");
    assert_eq!(sink.failures().len(), 1);

    session.begin_turn("next").unwrap();
}

#[tokio::test]
async fn test_recorder_captures_what_was_driven() {
    let (mut session, _) = new_session();
    let chunks = ["Hello ", r#"{"content":"again"}"#];
    let mut source = PlaybackChunkStream::new(recorded(&chunks), true);
    let mut recorder = StreamRecorder::new();

    drive_session(&mut session, &mut source, None, Some(&mut recorder)).await;

    let stream = recorder.into_stream();
    let data: Vec<&str> = stream.chunks.iter().map(|c| c.data.as_str()).collect();
    assert_eq!(data, chunks);

    // Replaying the recording gives the same message
    let (mut replayed, _) = new_session();
    let mut source = PlaybackChunkStream::new(stream, true);
    drive_session(&mut replayed, &mut source, None, None).await;
    assert_eq!(
        replayed.last_assistant_message().unwrap().content,
        session.last_assistant_message().unwrap().content
    );
}
