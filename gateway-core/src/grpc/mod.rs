//! gRPC interception pipeline.
//!
//! Provides:
//! - Authorization gating ahead of dispatch (`AuthGate`)
//! - W3C trace-context extraction and response-header injection
//! - A call-scoped span with exactly-once closure across all exit paths
//! - Correlation bracketing around every lifecycle callback
//! - Ordered interceptor composition around the runtime's handler

pub mod auth;
pub mod call;
pub mod chain;
pub mod listener;
pub mod propagation;
pub mod span;
pub mod trace;

use std::sync::Arc;

pub use auth::{AllowAll, AuthDecision, AuthGate, Authorizer};
pub use call::{OutboundCall, TracedCall};
pub use chain::{CallHandler, InterceptorChain, Next, ServerInterceptor};
pub use listener::{CallListener, NoopListener, TracedListener};
pub use propagation::{
    SPAN_ID_KEY, TRACE_ID_KEY, TRACEPARENT_KEY, TRACESTATE_KEY, extract_parent_context,
    inject_span_ids,
};
pub use span::{CallSpan, CallTracer, FinishedSpan, LogSpanSink, SpanIdentifiers, SpanSink};
pub use trace::TraceInterceptor;

/// The standard pipeline: authorization strictly before tracing, so denied
/// calls never show up as application work. Compose a chain by hand to pick
/// a different ordering.
pub fn gateway_pipeline<M>(
    authorizer: Arc<dyn Authorizer>,
    tracer: Arc<CallTracer>,
) -> InterceptorChain<M>
where
    M: Send + 'static,
{
    InterceptorChain::new()
        .with(Arc::new(AuthGate::new(authorizer)))
        .with(Arc::new(TraceInterceptor::new(tracer)))
}
