//! Per-pass error accounting and change-triggered notifications.
use std::sync::Arc;

/// Errors and warnings accumulated over one apply pass.
///
/// A command failure lands here and the pass keeps going; only
/// validation and guardrail failures abort a pass outright.
#[derive(Debug, Default)]
pub struct ErrorCollection {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ErrorCollection {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.errors.push(message);
    }

    /// Record a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// All errors, in the order they occurred.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// All warnings, in the order they occurred.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The first error of the pass, remembered as "last sync error".
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }

    /// Whether any error occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Destination for error-change notifications (chat, pager, ...).
pub trait NotificationSink: Send + Sync {
    /// Deliver one message.
    fn notify(&self, message: &str);
}

/// The default sink: notifications become log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, message: &str) {
        tracing::error!(notification = true, "{message}");
    }
}

/// Deduplicating reporter: a pass whose first error differs from the
/// previous pass's triggers exactly one notification; repeats of the
/// same error stay quiet until it changes again or clears.
pub struct ErrorReporter {
    sink: Arc<dyn NotificationSink>,
    last_error: Option<String>,
}

impl ErrorReporter {
    /// A reporter delivering to `sink`.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        ErrorReporter {
            sink,
            last_error: None,
        }
    }

    /// Digest one finished pass.
    pub fn report(&mut self, errors: &ErrorCollection) {
        let current = errors.first_error().map(str::to_string);
        if current != self.last_error {
            if let Some(message) = &current {
                self.sink.notify(message);
            }
            self.last_error = current;
        }
    }

    /// The most recent error, surviving across passes for status readers.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
