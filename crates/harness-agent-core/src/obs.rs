//! Structured observability hooks for run lifecycle events.
//!
//! - `RunSpan`, a span tagging everything inside a run with its id
//! - `emit_*` functions for the lifecycle events of a run
//!
//! Events are emitted at `info!` level, failures at `error!`. Set
//! `RUST_LOG` to filter and pass `--json` to the CLI for JSON lines.

use std::path::Path;

use tracing::{error, info};

use crate::publisher::PublishOutcome;

/// Run-scoped span tagging everything inside a run with its id.
///
/// Use [`RunSpan::enter`] around synchronous sections and
/// [`RunSpan::span`] with `tracing::Instrument` for futures, so the span is
/// never held entered across an `.await`.
///
/// ```ignore
/// let span = RunSpan::new(&run_id);
/// workflow.instrument(span.span().clone()).await;
/// ```
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("harness_agent.run", run_id = %run_id),
        }
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Enter the span until the returned guard is dropped.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Emit event: run started against a model.
pub fn emit_run_started(run_id: &str, model: &str, root: &Path) {
    info!(event = "run.started", run_id = %run_id, model = %model, root = ?root);
}

/// Emit event: generated text passed validation.
pub fn emit_document_validated(run_id: &str, digest: &str, bytes: usize) {
    info!(event = "document.validated", run_id = %run_id, digest = %digest, bytes = bytes);
}

pub fn emit_artifact_written(run_id: &str, path: &Path) {
    info!(event = "artifact.written", run_id = %run_id, path = ?path);
}

pub fn emit_publish_completed(run_id: &str, outcome: &PublishOutcome) {
    match outcome {
        PublishOutcome::NothingToPublish => {
            info!(event = "publish.completed", run_id = %run_id, published = false);
        }
        PublishOutcome::Published {
            commit,
            remote,
            refspec,
            ..
        } => {
            info!(
                event = "publish.completed",
                run_id = %run_id,
                published = true,
                commit = %commit,
                remote = %remote,
                refspec = %refspec,
            );
        }
    }
}

/// Emit event: run finished successfully.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, published: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        published = published,
    );
}

/// Emit event: run aborted at `stage`.
pub fn emit_run_failed(run_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    error!(event = "run.failed", run_id = %run_id, stage = %stage, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_run_span_and_events_are_logged() {
        let span = RunSpan::new("run-123");
        let _guard = span.enter();
        emit_run_started("run-123", "gpt-4o", Path::new("/work"));
        emit_document_validated("run-123", "abcdef123456", 11);
        emit_publish_completed("run-123", &PublishOutcome::NothingToPublish);
        emit_run_finished("run-123", 42, false);

        assert!(logs_contain("run.started"));
        assert!(logs_contain("document.validated"));
        assert!(logs_contain("publish.completed"));
        assert!(logs_contain("run.finished"));
    }

    #[traced_test]
    #[test]
    fn test_run_failed_logs_stage() {
        emit_run_failed("run-err", "validation", &"bad yaml");
        assert!(logs_contain("run.failed"));
        assert!(logs_contain("validation"));
    }
}
