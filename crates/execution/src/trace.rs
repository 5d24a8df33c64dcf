//! Tracing context bridge.
//!
//! The context is captured on the submitting thread and carried explicitly in
//! the queued job. The worker restores it around exactly one task body and
//! releases it afterwards, even when the body fails or panics.

use delegate_core::{TaskId, TaskKind, TraceContext};
use tracing::Span;

/// Capture/restore/release primitives over an opaque [`TraceContext`].
pub trait TraceBridge: Send + Sync {
    /// Capture the caller's context. Called on the submitting thread.
    fn capture(&self) -> TraceContext;

    /// Produce the span the task body runs under.
    fn restore(&self, context: &TraceContext, id: &TaskId, kind: TaskKind, target: &str) -> Span;

    /// Called once the body finished, with the span from `restore`.
    fn release(&self, _span: Span) {}
}

/// Bridge over the `tracing` crate: task spans are children of the span that
/// was current at submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanBridge;

impl TraceBridge for SpanBridge {
    fn capture(&self) -> TraceContext {
        TraceContext::from_span(Span::current())
    }

    fn restore(&self, context: &TraceContext, id: &TaskId, kind: TaskKind, target: &str) -> Span {
        match context.parent() {
            Some(parent) => tracing::info_span!(
                parent: parent,
                "task",
                task.id = %id,
                task.kind = %kind,
                task.target = %target
            ),
            None => tracing::info_span!(
                parent: None,
                "task",
                task.id = %id,
                task.kind = %kind,
                task.target = %target
            ),
        }
    }
}

/// Bridge for when no tracing backend is wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBridge;

impl TraceBridge for NoopBridge {
    fn capture(&self) -> TraceContext {
        TraceContext::detached()
    }

    fn restore(&self, _context: &TraceContext, _id: &TaskId, _kind: TaskKind, _target: &str) -> Span {
        Span::none()
    }
}

/// A restored context; releases it on drop.
pub(crate) struct RestoredContext<'a> {
    bridge: &'a dyn TraceBridge,
    span: Option<Span>,
}

impl<'a> RestoredContext<'a> {
    pub(crate) fn restore(
        bridge: &'a dyn TraceBridge,
        context: &TraceContext,
        id: &TaskId,
        kind: TaskKind,
        target: &str,
    ) -> Self {
        Self {
            bridge,
            span: Some(bridge.restore(context, id, kind, target)),
        }
    }

    pub(crate) fn span(&self) -> Span {
        self.span.clone().unwrap_or_else(Span::none)
    }
}

impl Drop for RestoredContext<'_> {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            self.bridge.release(span);
        }
    }
}
