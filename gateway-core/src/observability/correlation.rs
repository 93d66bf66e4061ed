//! Call-scoped log-correlation context.
//!
//! Holds the active call's trace identifiers in a task-local slot so that
//! both application code (via [`current`]) and the logging subsystem (via an
//! entered `tracing` span carrying the same fields) can correlate output with
//! the call being processed. The slot is populated strictly for the duration
//! of a bracketed closure or future and restored on every exit path,
//! including unwinding, so identifiers never leak across callbacks or across
//! concurrent calls.

use std::future::Future;

use tracing::Instrument;

tokio::task_local! {
    static ACTIVE_CALL: CorrelationContext;
}

/// The three correlation keys attached to log output while a call's
/// callback (or interceptor setup) is executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    pub trace_id: String,
    pub span_id: String,
    pub trace_flags: String,
}

/// The correlation context of the call currently being processed on this
/// task, if any.
pub fn current() -> Option<CorrelationContext> {
    ACTIVE_CALL.try_with(|context| context.clone()).ok()
}

/// Run `f` with `context` as the ambient correlation context.
///
/// The previous state is restored when `f` returns or panics.
pub fn with_correlation<R>(context: CorrelationContext, f: impl FnOnce() -> R) -> R {
    let span = correlation_span(&context);
    ACTIVE_CALL.sync_scope(context, || span.in_scope(f))
}

/// Run `future` with `context` as the ambient correlation context.
pub async fn scope<F>(context: CorrelationContext, future: F) -> F::Output
where
    F: Future,
{
    let span = correlation_span(&context);
    ACTIVE_CALL.scope(context, future.instrument(span)).await
}

fn correlation_span(context: &CorrelationContext) -> tracing::Span {
    tracing::info_span!(
        "grpc_call",
        trace_id = %context.trace_id,
        span_id = %context.span_id,
        trace_flags = %context.trace_flags,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::AssertUnwindSafe;

    fn context(trace_id: &str) -> CorrelationContext {
        CorrelationContext {
            trace_id: trace_id.to_string(),
            span_id: "00f067aa0ba902b7".to_string(),
            trace_flags: "01".to_string(),
        }
    }

    #[test]
    fn test_empty_outside_scope() {
        assert!(current().is_none());
    }

    #[test]
    fn test_populated_during_closure_and_cleared_after() {
        let ctx = context("4bf92f3577b34da6a3ce929d0e0e4736");

        let observed = with_correlation(ctx.clone(), current);
        assert_eq!(observed, Some(ctx));
        assert!(current().is_none());
    }

    #[test]
    fn test_cleared_after_panicking_closure() {
        let ctx = context("4bf92f3577b34da6a3ce929d0e0e4736");

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            with_correlation(ctx, || panic!("callback failure"))
        }));
        assert!(result.is_err());
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_tasks_see_their_own_context() {
        let first = context("11111111111111111111111111111111");
        let second = context("22222222222222222222222222222222");

        let task_a = tokio::spawn(scope(first.clone(), async move {
            tokio::task::yield_now().await;
            current()
        }));
        let task_b = tokio::spawn(scope(second.clone(), async move {
            tokio::task::yield_now().await;
            current()
        }));

        assert_eq!(task_a.await.unwrap(), Some(first));
        assert_eq!(task_b.await.unwrap(), Some(second));
        assert!(current().is_none());
    }
}
