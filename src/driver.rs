//! Async loop that pulls chunks from a source into a session

use crate::error::StreamError;
use crate::recording::{ChunkSource, StreamRecorder};
use crate::session::StreamSession;
use std::time::Duration;
use tracing::{debug, warn};

/// Feed `source` into `session` until the transport ends, then close the
/// session so the turn always ends finalized.
///
/// Reading stops at the first error unit. When `idle_timeout` elapses without
/// a chunk the transport is abandoned and the turn finalized like a normal
/// end of stream; [`StreamError::IdleTimeout`] is still returned. A source
/// error fails the turn with [`StreamError::TransportClosed`] before closing.
/// Returns the error that ended the turn, if any.
pub async fn drive_session(
    session: &mut StreamSession,
    source: &mut dyn ChunkSource,
    idle_timeout: Option<Duration>,
    recorder: Option<&mut StreamRecorder>,
) -> Option<StreamError> {
    let outcome = pump(session, source, idle_timeout, recorder).await;

    match session.close() {
        Ok(()) => outcome,
        Err(error) => outcome.or(Some(error)),
    }
}

async fn pump(
    session: &mut StreamSession,
    source: &mut dyn ChunkSource,
    idle_timeout: Option<Duration>,
    mut recorder: Option<&mut StreamRecorder>,
) -> Option<StreamError> {
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, source.next_chunk()).await {
                Ok(next) => next,
                Err(_) => {
                    let error = StreamError::IdleTimeout {
                        seconds: limit.as_secs(),
                    };
                    warn!("{}, closing the stream", error);
                    return Some(error);
                }
            },
            None => source.next_chunk().await,
        };

        let chunk = match next {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return None,
            Err(err) => {
                let error = StreamError::TransportClosed {
                    reason: format!("{err:#}"),
                };
                session.fail(error.clone());
                return Some(error);
            }
        };

        debug!("Received chunk of {} bytes", chunk.len());
        if let Some(recorder) = recorder.as_deref_mut() {
            recorder.record_chunk(&chunk);
        }
        if let Err(error) = session.push_bytes(&chunk) {
            return Some(error);
        }
    }
}
