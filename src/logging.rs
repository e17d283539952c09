//! Tracing setup: compact console output plus a daily rolling log file.

use std::path::Path;

use anyhow::Context as _;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const MAX_MESSAGE_CHARS: usize = 280;

/// Truncate to at most `max_chars` characters, reporting whether anything was cut.
pub fn truncate_for_log(message: &str, max_chars: usize) -> (&str, bool) {
    match message.char_indices().nth(max_chars) {
        Some((byte_index, _character)) => (&message[..byte_index], true),
        None => (message, false),
    }
}

/// Initialize the global subscriber.
///
/// The returned guard flushes the file writer on drop; hold it for the
/// process lifetime.
pub fn init_tracing(log_dir: &Path, debug: bool) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "ticketrelay.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .fmt_fields(format::debug_fn(format_field))
        .compact();
    let console_layer = tracing_subscriber::fmt::layer()
        .fmt_fields(format::debug_fn(format_field))
        .compact();

    tracing_subscriber::registry()
        .with(build_env_filter(debug))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// Shorten long `message` fields so transcripts never flood the log.
fn format_field(
    writer: &mut format::Writer<'_>,
    field: &tracing::field::Field,
    value: &dyn std::fmt::Debug,
) -> std::fmt::Result {
    let field_name = field.name();
    if field_name == "message" {
        let formatted = format!("{value:?}");
        let (truncated, was_truncated) = truncate_for_log(&formatted, MAX_MESSAGE_CHARS);
        if was_truncated {
            write!(writer, "{field_name}={truncated}...")
        } else {
            write!(writer, "{field_name}={formatted}")
        }
    } else {
        write!(writer, "{field_name}={value:?}")
    }
}

/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `--debug`.
fn build_env_filter(debug: bool) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::new("info")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_for_log_handles_multibyte_characters() {
        let message = "abc→def";
        let (truncated, was_truncated) = truncate_for_log(message, 4);

        assert!(was_truncated);
        assert_eq!(truncated, "abc→");
    }

    #[test]
    fn truncate_for_log_returns_original_when_within_limit() {
        let (truncated, was_truncated) = truncate_for_log("hello", 10);

        assert!(!was_truncated);
        assert_eq!(truncated, "hello");
    }
}
