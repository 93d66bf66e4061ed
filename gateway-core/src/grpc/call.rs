//! Outbound-call wrapping: span-id injection into the first header send.

use std::sync::Arc;

use tonic::Status;
use tonic::metadata::MetadataMap;

use super::propagation;
use super::span::CallSpan;

/// The narrow interface this pipeline needs from the transport's per-call
/// send side.
pub trait OutboundCall: Send {
    /// Fully-qualified RPC method name, e.g. `pkg.Service/Method`.
    fn method_name(&self) -> &str;

    /// Send the response headers. The transport permits at most one send.
    fn send_headers(&mut self, headers: MetadataMap);

    /// Terminate the call with the given status.
    fn close(&mut self, status: Status);
}

/// Wraps a call so the first header send carries the call's trace and span
/// ids. Injection mutates the outgoing metadata in place before delegating;
/// no extra send is issued.
pub struct TracedCall {
    inner: Box<dyn OutboundCall>,
    span: Arc<CallSpan>,
    headers_sent: bool,
}

impl TracedCall {
    pub fn new(inner: Box<dyn OutboundCall>, span: Arc<CallSpan>) -> Self {
        Self {
            inner,
            span,
            headers_sent: false,
        }
    }
}

impl OutboundCall for TracedCall {
    fn method_name(&self) -> &str {
        self.inner.method_name()
    }

    fn send_headers(&mut self, mut headers: MetadataMap) {
        if !self.headers_sent {
            propagation::inject_span_ids(&mut headers, self.span.identifiers());
            self.headers_sent = true;
        }
        self.inner.send_headers(headers);
    }

    fn close(&mut self, status: Status) {
        self.inner.close(status);
    }
}
