//! Per-call listener wrapping: correlation bracketing around every lifecycle
//! callback and exactly-once span closure on the terminal ones.

use std::sync::Arc;

use crate::observability::correlation;

use super::span::CallSpan;

/// The callback hooks the RPC runtime invokes over a call's lifecycle.
///
/// Events arrive in runtime order: zero or more messages, then half-close,
/// then exactly one of cancel or complete. `on_ready` may fire at any point.
pub trait CallListener<M>: Send {
    fn on_message(&mut self, _message: M) {}
    fn on_half_close(&mut self) {}
    fn on_cancel(&mut self) {}
    fn on_complete(&mut self) {}
    fn on_ready(&mut self) {}
}

/// Listener that ignores every event. Returned for calls that were
/// terminated before reaching a handler.
pub struct NoopListener;

impl<M> CallListener<M> for NoopListener {}

/// Wraps the delegate listener so every callback runs with the call's
/// correlation context populated, and so cancel/complete close the span.
///
/// Closure uses a drop guard: the span ends after the delegate callback and
/// the correlation teardown, on panicking callbacks too. Dropping the
/// wrapper without a terminal callback also closes the span; the span's
/// idempotent `end` absorbs any overlap between these paths.
pub struct TracedListener<M> {
    delegate: Box<dyn CallListener<M>>,
    span: Arc<CallSpan>,
}

impl<M> TracedListener<M> {
    pub fn new(delegate: Box<dyn CallListener<M>>, span: Arc<CallSpan>) -> Self {
        Self { delegate, span }
    }
}

impl<M: Send> CallListener<M> for TracedListener<M> {
    fn on_message(&mut self, message: M) {
        let context = self.span.identifiers().correlation();
        let delegate = self.delegate.as_mut();
        correlation::with_correlation(context, || delegate.on_message(message));
    }

    fn on_half_close(&mut self) {
        let context = self.span.identifiers().correlation();
        let delegate = self.delegate.as_mut();
        correlation::with_correlation(context, || delegate.on_half_close());
    }

    fn on_cancel(&mut self) {
        let _close = EndSpanOnDrop(&self.span);
        let context = self.span.identifiers().correlation();
        let delegate = self.delegate.as_mut();
        correlation::with_correlation(context, || delegate.on_cancel());
    }

    fn on_complete(&mut self) {
        let _close = EndSpanOnDrop(&self.span);
        let context = self.span.identifiers().correlation();
        let delegate = self.delegate.as_mut();
        correlation::with_correlation(context, || delegate.on_complete());
    }

    fn on_ready(&mut self) {
        let context = self.span.identifiers().correlation();
        let delegate = self.delegate.as_mut();
        correlation::with_correlation(context, || delegate.on_ready());
    }
}

impl<M> Drop for TracedListener<M> {
    fn drop(&mut self) {
        self.span.end();
    }
}

struct EndSpanOnDrop<'a>(&'a CallSpan);

impl Drop for EndSpanOnDrop<'_> {
    fn drop(&mut self) {
        self.0.end();
    }
}
