mod cli;

use anyhow::{Context, Result};
use cli::Args;
use std::sync::Arc;
use std::time::Duration;
use stream_assembler::config::AssemblerConfig;
use stream_assembler::driver::drive_session;
use stream_assembler::logging::setup_logging;
use stream_assembler::recording::{
    ChunkSource, PlaybackChunkStream, ReaderChunkStream, RecordedStream, StreamRecorder,
};
use stream_assembler::ui::{MessageSink, TerminalSink};
use stream_assembler::StreamSession;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose, args.log_file.as_deref());

    let mut config = match &args.config {
        Some(path) => AssemblerConfig::from_file(path)?,
        None => AssemblerConfig::load(),
    };
    if let Some(framing) = args.framing {
        config.framing = framing;
    }

    let sink: Arc<Box<dyn MessageSink>> =
        Arc::new(Box::new(TerminalSink::new(args.show_rendered)));
    let mut session = StreamSession::with_default_renderer(config, sink);

    if let Some(prompt) = &args.prompt {
        session.begin_turn(prompt)?;
    }

    let mut source: Box<dyn ChunkSource> = match &args.playback {
        Some(path) => {
            let stream = RecordedStream::from_file(path)?;
            info!(
                "Playing back {} chunks from {}",
                stream.chunks.len(),
                path.display()
            );
            Box::new(PlaybackChunkStream::new(stream, args.fast_playback))
        }
        None => Box::new(ReaderChunkStream::new(tokio::io::stdin())),
    };

    let idle_timeout = (args.idle_timeout > 0).then(|| Duration::from_secs(args.idle_timeout));
    let mut recorder = args.record.as_ref().map(|_| StreamRecorder::new());

    let outcome = drive_session(
        &mut session,
        source.as_mut(),
        idle_timeout,
        recorder.as_mut(),
    )
    .await;

    if let (Some(path), Some(mut recorder)) = (&args.record, recorder) {
        recorder.set_session_id(session.session_id().map(str::to_string));
        recorder
            .save(path)
            .with_context(|| format!("Failed to save recording to {}", path.display()))?;
        info!("Recorded {} chunks", recorder.chunk_count());
    }

    match outcome {
        Some(error) => Err(anyhow::Error::new(error).context("Stream ended with an error")),
        None => Ok(()),
    }
}
