use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the `-v` count picks the filter.
/// Logs go to stderr so stdout only carries the conversation, or to
/// `log_file` when one is given.
pub fn setup_logging(verbose_level: u8, log_file: Option<&Path>) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        tracing_subscriber::EnvFilter::new(filter_for_verbosity(verbose_level))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true);

    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| {
                eprintln!(
                    "Warning: Could not open log file {}: {err}, falling back to stderr",
                    path.display()
                );
            })
            .ok()
    });

    match file {
        Some(file) => subscriber.with_ansi(false).with_writer(Mutex::new(file)).init(),
        None => subscriber.with_writer(std::io::stderr).init(),
    }
}

fn filter_for_verbosity(verbose_level: u8) -> &'static str {
    match verbose_level {
        0 => "warn,stream_assembler=info",
        1 => "info,stream_assembler=debug",
        _ => "debug,stream_assembler=trace",
    }
}
