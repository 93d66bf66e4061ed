//! Per-call span lifecycle: creation, identifier access, and exactly-once
//! closure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId};
use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator};

use crate::observability::correlation::CorrelationContext;

/// The identifiers of one call's span, readable in any lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanIdentifiers {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub trace_flags: TraceFlags,
}

impl SpanIdentifiers {
    /// The correlation representation: fixed-width lowercase hex strings.
    pub fn correlation(&self) -> CorrelationContext {
        CorrelationContext {
            trace_id: self.trace_id.to_string(),
            span_id: self.span_id.to_string(),
            trace_flags: format!("{:02x}", self.trace_flags.to_u8()),
        }
    }
}

/// A completed span, handed to the [`SpanSink`] exactly once.
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub name: String,
    pub identifiers: SpanIdentifiers,
    pub parent: Option<SpanContext>,
    pub started_at: SystemTime,
    pub ended_at: SystemTime,
}

/// Export collaborator. Receives each completed span once; transport,
/// batching, and backend wiring live behind implementations of this trait.
pub trait SpanSink: Send + Sync {
    fn on_end(&self, span: FinishedSpan);
}

/// Default sink: logs completed spans instead of exporting them.
#[derive(Debug, Default)]
pub struct LogSpanSink;

impl SpanSink for LogSpanSink {
    fn on_end(&self, span: FinishedSpan) {
        let duration_ms = span
            .ended_at
            .duration_since(span.started_at)
            .unwrap_or_default()
            .as_millis() as u64;
        tracing::debug!(
            name = %span.name,
            trace_id = %span.identifiers.trace_id,
            span_id = %span.identifiers.span_id,
            duration_ms,
            "Span completed"
        );
    }
}

/// One call's unit of tracing work.
///
/// Created by [`CallTracer::start_span`] at interception time and shared
/// between the call wrapper and the listener wrapper. `end` may be reached
/// from the terminal callback, from the interceptor's failure path, or from
/// the listener wrapper's drop fallback; the atomic flag makes the closure
/// race-free and idempotent.
pub struct CallSpan {
    name: String,
    identifiers: SpanIdentifiers,
    parent: Option<SpanContext>,
    started_at: SystemTime,
    ended: AtomicBool,
    sink: Arc<dyn SpanSink>,
}

impl CallSpan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifiers(&self) -> &SpanIdentifiers {
        &self.identifiers
    }

    /// The extracted upstream span context this span descends from, if any.
    pub fn parent(&self) -> Option<&SpanContext> {
        self.parent.as_ref()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Close the span. The first caller hands the finished span to the sink;
    /// every later caller is a no-op.
    pub fn end(&self) {
        if self
            .ended
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.sink.on_end(FinishedSpan {
                name: self.name.clone(),
                identifiers: self.identifiers.clone(),
                parent: self.parent.clone(),
                started_at: self.started_at,
                ended_at: SystemTime::now(),
            });
        }
    }
}

/// Explicitly constructed tracing handle, injected into the interceptor
/// chain at build time. Owns id generation and the export sink.
pub struct CallTracer {
    id_generator: Box<dyn IdGenerator>,
    sink: Arc<dyn SpanSink>,
}

impl CallTracer {
    pub fn new(sink: Arc<dyn SpanSink>) -> Self {
        Self {
            id_generator: Box::new(RandomIdGenerator::default()),
            sink,
        }
    }

    /// Start a span for one call. With a parent, the span joins the parent's
    /// trace and inherits its flags; without one, a fresh sampled trace is
    /// started.
    pub fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Arc<CallSpan> {
        let (trace_id, trace_flags) = match parent {
            Some(parent) => (parent.trace_id(), parent.trace_flags()),
            None => (self.id_generator.new_trace_id(), TraceFlags::SAMPLED),
        };

        Arc::new(CallSpan {
            name: name.to_string(),
            identifiers: SpanIdentifiers {
                trace_id,
                span_id: self.id_generator.new_span_id(),
                trace_flags,
            },
            parent: parent.cloned(),
            started_at: SystemTime::now(),
            ended: AtomicBool::new(false),
            sink: Arc::clone(&self.sink),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TraceState;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<FinishedSpan>>);

    impl SpanSink for CollectingSink {
        fn on_end(&self, span: FinishedSpan) {
            self.0.lock().unwrap().push(span);
        }
    }

    fn tracer_with_sink() -> (CallTracer, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        (CallTracer::new(sink.clone()), sink)
    }

    fn remote_parent() -> SpanContext {
        SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        )
    }

    #[test]
    fn test_root_span_gets_fresh_sampled_trace() {
        let (tracer, _sink) = tracer_with_sink();

        let span = tracer.start_span("pkg.Service/Call", None);
        assert_ne!(span.identifiers().trace_id, TraceId::INVALID);
        assert_ne!(span.identifiers().span_id, SpanId::INVALID);
        assert_eq!(span.identifiers().trace_flags, TraceFlags::SAMPLED);
        assert!(span.parent().is_none());
        assert!(!span.is_ended());
    }

    #[test]
    fn test_child_span_joins_parent_trace() {
        let (tracer, _sink) = tracer_with_sink();
        let parent = remote_parent();

        let span = tracer.start_span("pkg.Service/Call", Some(&parent));
        assert_eq!(span.identifiers().trace_id, parent.trace_id());
        assert_ne!(span.identifiers().span_id, parent.span_id());
        assert_eq!(span.identifiers().trace_flags, parent.trace_flags());
        assert_eq!(span.parent(), Some(&parent));
    }

    #[test]
    fn test_end_is_idempotent() {
        let (tracer, sink) = tracer_with_sink();
        let span = tracer.start_span("pkg.Service/Call", None);

        span.end();
        span.end();

        assert!(span.is_ended());
        let finished = sink.0.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "pkg.Service/Call");
        assert_eq!(&finished[0].identifiers, span.identifiers());
    }

    #[test]
    fn test_racing_closers_export_once() {
        let (tracer, sink) = tracer_with_sink();
        let span = tracer.start_span("pkg.Service/Call", None);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let span = Arc::clone(&span);
                std::thread::spawn(move || span.end())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_correlation_representation_is_fixed_hex() {
        let identifiers = SpanIdentifiers {
            trace_id: TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            span_id: SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            trace_flags: TraceFlags::SAMPLED,
        };

        let context = identifiers.correlation();
        assert_eq!(context.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(context.span_id, "00f067aa0ba902b7");
        assert_eq!(context.trace_flags, "01");
    }
}
