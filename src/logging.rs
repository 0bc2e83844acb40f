//! User-facing progress output.
//!
//! Diagnostics go through `tracing`. Lines a person running the harness should
//! see (scenario steps, cleanup summaries) go through a pluggable
//! [`OutputSink`] so tests can silence them and the binary can colorize them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Destination for progress lines.
pub trait OutputSink: Send + Sync {
    fn emit(&self, message: &str);
}

/// Writes each line to stderr.
#[derive(Debug, Default)]
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn emit(&self, message: &str) {
        eprintln!("{message}");
    }
}

static OUTPUT_SINK: RwLock<Option<Arc<dyn OutputSink>>> = RwLock::new(None);
static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn set_output_sink(sink: Arc<dyn OutputSink>) {
    let mut guard = match OUTPUT_SINK.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("output sink lock was poisoned, recovering");
            poisoned.into_inner()
        }
    };
    *guard = Some(sink);
}

/// Drop the installed sink; subsequent events go to stderr.
pub fn reset_output_sink() {
    let mut guard = match OUTPUT_SINK.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = None;
}

pub fn get_output_sink() -> Option<Arc<dyn OutputSink>> {
    match OUTPUT_SINK.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub fn disable_logging() {
    LOGGING_ENABLED.store(false, Ordering::SeqCst);
}

pub fn is_logging_enabled() -> bool {
    LOGGING_ENABLED.load(Ordering::SeqCst)
}

/// Emit a progress line to the current sink.
pub fn log_event(message: &str) {
    if !is_logging_enabled() {
        return;
    }
    match get_output_sink() {
        Some(sink) => sink.emit(message),
        None => StderrSink.emit(message),
    }
}
