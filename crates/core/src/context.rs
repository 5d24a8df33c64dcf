//! Opaque tracing context captured at submission time.

use tracing::Span;

/// Handle to the tracing context of the call site that submitted a task.
///
/// The handle is produced once, on the submitting thread, and handed to the
/// worker that runs the task. It is immutable after capture. A detached
/// context means nothing was captured (no subscriber, or tracing disabled).
#[derive(Clone, Default)]
pub struct TraceContext {
    parent: Option<Span>,
}

impl TraceContext {
    /// A context that links to nothing.
    pub fn detached() -> Self {
        Self { parent: None }
    }

    /// Wrap a captured span. Disabled spans produce a detached context.
    pub fn from_span(span: Span) -> Self {
        if span.is_disabled() {
            Self::detached()
        } else {
            Self { parent: Some(span) }
        }
    }

    /// The captured parent span, if any.
    pub fn parent(&self) -> Option<&Span> {
        self.parent.as_ref()
    }

    /// Whether nothing was captured.
    pub fn is_detached(&self) -> bool {
        self.parent.is_none()
    }
}

impl std::fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.parent.as_ref().and_then(Span::id) {
            Some(id) => write!(f, "TraceContext({})", id.into_u64()),
            None => f.write_str("TraceContext(detached)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_span_is_detached() {
        // No subscriber is installed, so every span is disabled.
        let ctx = TraceContext::from_span(tracing::info_span!("submit"));
        assert!(ctx.is_detached());
        assert_eq!(format!("{:?}", ctx), "TraceContext(detached)");
    }

    #[test]
    fn test_default_is_detached() {
        assert!(TraceContext::default().is_detached());
        assert!(TraceContext::detached().parent().is_none());
    }
}
