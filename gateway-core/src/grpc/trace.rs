//! Tracing interceptor: composition root for extraction, span lifecycle,
//! call wrapping, and listener wrapping.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::Status;
use tonic::metadata::MetadataMap;

use crate::observability::correlation;

use super::call::{OutboundCall, TracedCall};
use super::chain::{Next, ServerInterceptor};
use super::listener::{CallListener, TracedListener};
use super::propagation;
use super::span::{CallSpan, CallTracer};

/// Establishes the tracing context for each call: links to the upstream
/// trace when a valid `traceparent` arrives, starts a call-scoped span,
/// arranges response-header injection, and brackets the downstream stages
/// and every later callback with the call's correlation context.
pub struct TraceInterceptor {
    tracer: Arc<CallTracer>,
}

impl TraceInterceptor {
    pub fn new(tracer: Arc<CallTracer>) -> Self {
        Self { tracer }
    }
}

#[async_trait]
impl<M> ServerInterceptor<M> for TraceInterceptor
where
    M: Send + 'static,
{
    async fn intercept(
        &self,
        call: Box<dyn OutboundCall>,
        headers: &MetadataMap,
        next: Next<'_, M>,
    ) -> Result<Box<dyn CallListener<M>>, Status> {
        let parent = propagation::extract_parent_context(headers);
        let span = self.tracer.start_span(call.method_name(), parent.as_ref());
        let context = span.identifiers().correlation();

        let wrapped = TracedCall::new(call, Arc::clone(&span));

        // If the rest of the chain fails (or this future is dropped) before
        // a listener exists, the guard closes the span on unwind.
        let mut guard = EndOnUnwind::new(Arc::clone(&span));
        let result = correlation::scope(context, next.run(Box::new(wrapped), headers)).await;

        match result {
            Ok(delegate) => {
                guard.disarm();
                Ok(Box::new(TracedListener::new(delegate, span)))
            }
            Err(status) => Err(status),
        }
    }
}

struct EndOnUnwind {
    span: Option<Arc<CallSpan>>,
}

impl EndOnUnwind {
    fn new(span: Arc<CallSpan>) -> Self {
        Self { span: Some(span) }
    }

    fn disarm(&mut self) {
        self.span = None;
    }
}

impl Drop for EndOnUnwind {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            span.end();
        }
    }
}
