//! Span definitions for plugin lifecycle and dispatch.

use std::path::Path;
use std::time::Instant;

use tracing::{Level, Span, field, span};

use crate::plugins::PluginHook;

pub fn load_span(path: &Path) -> Span {
    span!(
        Level::INFO,
        "plugin.load",
        path = %path.display(),
        identity = field::Empty,
    )
}

pub fn reload_span() -> Span {
    span!(Level::INFO, "plugin.reload", plugins = field::Empty)
}

pub fn install_span(name: &str, version: &str) -> Span {
    span!(Level::INFO, "plugin.install", name = name, version = version)
}

/// Span around one hook dispatched to every plugin, recording how many
/// plugins failed and how long the dispatch took.
pub struct HookSpan {
    span: Span,
    start: Instant,
    failures: u64,
}

impl HookSpan {
    pub fn new(hook: PluginHook) -> Self {
        let span = span!(
            Level::DEBUG,
            "plugin.hook",
            hook = %hook,
            plugins = field::Empty,
            failures = field::Empty,
            duration_ms = field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            failures: 0,
        }
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn finish(self, plugins: usize) {
        self.span.record("plugins", plugins as u64);
        self.span.record("failures", self.failures);
        self.span
            .record("duration_ms", self.start.elapsed().as_millis() as u64);
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_span_counts_failures() {
        let mut span = HookSpan::new(PluginHook::GetCardActions);
        span.record_failure();
        span.record_failure();
        assert_eq!(span.failures(), 2);
        span.finish(3);
    }
}
