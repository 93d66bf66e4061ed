//! W3C trace-context extraction and response-header injection over gRPC
//! metadata.

use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tonic::metadata::MetadataMap;

use super::span::SpanIdentifiers;

/// Inbound metadata key for the W3C traceparent header.
pub const TRACEPARENT_KEY: &str = "traceparent";

/// Inbound metadata key for the W3C tracestate header.
pub const TRACESTATE_KEY: &str = "tracestate";

/// Outbound metadata key carrying the call's trace id.
pub const TRACE_ID_KEY: &str = "x-trace-id";

/// Outbound metadata key carrying the call's span id.
pub const SPAN_ID_KEY: &str = "x-span-id";

/// A text map extractor for gRPC metadata.
struct MetadataExtractor<'a>(&'a MetadataMap);

impl Extractor for MetadataExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .filter_map(|k| {
                if let tonic::metadata::KeyRef::Ascii(key) = k {
                    Some(key.as_str())
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Extract the upstream span context from inbound metadata.
///
/// Returns `None` when the traceparent header is absent or malformed;
/// malformed input never fails the call, it only suppresses parent linkage.
pub fn extract_parent_context(metadata: &MetadataMap) -> Option<SpanContext> {
    let extractor = MetadataExtractor(metadata);
    let propagator = TraceContextPropagator::new();
    let context = propagator.extract(&extractor);

    let span_context = context.span().span_context().clone();
    span_context.is_valid().then_some(span_context)
}

/// Write the call's trace and span ids into outbound metadata.
///
/// `insert` semantics keep this idempotent for repeated calls with the same
/// span.
pub fn inject_span_ids(metadata: &mut MetadataMap, identifiers: &SpanIdentifiers) {
    if let Ok(value) = identifiers.trace_id.to_string().parse() {
        metadata.insert(TRACE_ID_KEY, value);
    }
    if let Ok(value) = identifiers.span_id.to_string().parse() {
        metadata.insert(SPAN_ID_KEY, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanId, TraceFlags, TraceId};

    fn metadata_with_traceparent(value: &str) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        metadata.insert(TRACEPARENT_KEY, value.parse().unwrap());
        metadata
    }

    #[test]
    fn test_extract_valid_traceparent() {
        let metadata = metadata_with_traceparent(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        );

        let parent = extract_parent_context(&metadata).expect("parent context");
        assert_eq!(
            parent.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
        );
        assert_eq!(
            parent.span_id(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap()
        );
        assert!(parent.is_remote());
        assert!(parent.is_sampled());
    }

    #[test]
    fn test_extract_missing_traceparent() {
        let metadata = MetadataMap::new();
        assert!(extract_parent_context(&metadata).is_none());
    }

    #[test]
    fn test_extract_malformed_traceparent() {
        let metadata = metadata_with_traceparent("not-a-traceparent");
        assert!(extract_parent_context(&metadata).is_none());
    }

    #[test]
    fn test_extract_all_zero_trace_id() {
        let metadata = metadata_with_traceparent(
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
        );
        assert!(extract_parent_context(&metadata).is_none());
    }

    #[test]
    fn test_inject_span_ids() {
        let identifiers = SpanIdentifiers {
            trace_id: TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            span_id: SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            trace_flags: TraceFlags::SAMPLED,
        };

        let mut metadata = MetadataMap::new();
        inject_span_ids(&mut metadata, &identifiers);

        assert_eq!(
            metadata.get(TRACE_ID_KEY).unwrap().to_str().unwrap(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(
            metadata.get(SPAN_ID_KEY).unwrap().to_str().unwrap(),
            "00f067aa0ba902b7"
        );
    }

    #[test]
    fn test_inject_twice_is_idempotent() {
        let identifiers = SpanIdentifiers {
            trace_id: TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            span_id: SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            trace_flags: TraceFlags::SAMPLED,
        };

        let mut metadata = MetadataMap::new();
        inject_span_ids(&mut metadata, &identifiers);
        inject_span_ids(&mut metadata, &identifiers);

        assert_eq!(metadata.len(), 2);
        assert_eq!(
            metadata.get(TRACE_ID_KEY).unwrap().to_str().unwrap(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }
}
