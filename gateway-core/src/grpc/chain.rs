//! Ordered interceptor composition.
//!
//! Each interceptor receives the call, its inbound metadata, and a handle to
//! the remainder of the chain; it may short-circuit (closing the call and
//! returning its own listener) or delegate and wrap the result.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::Status;
use tonic::metadata::MetadataMap;

use super::call::OutboundCall;
use super::listener::CallListener;

/// Terminal stage of the chain: the method dispatch supplied by the RPC
/// runtime. Returns the per-call listener the runtime will drive.
#[async_trait]
pub trait CallHandler<M>: Send + Sync
where
    M: Send + 'static,
{
    async fn start_call(
        &self,
        call: Box<dyn OutboundCall>,
        headers: &MetadataMap,
    ) -> Result<Box<dyn CallListener<M>>, Status>;
}

/// One stage of the interception pipeline.
#[async_trait]
pub trait ServerInterceptor<M>: Send + Sync
where
    M: Send + 'static,
{
    async fn intercept(
        &self,
        call: Box<dyn OutboundCall>,
        headers: &MetadataMap,
        next: Next<'_, M>,
    ) -> Result<Box<dyn CallListener<M>>, Status>;
}

/// The remainder of the chain, ending in the handler.
pub struct Next<'a, M> {
    interceptors: &'a [Arc<dyn ServerInterceptor<M>>],
    handler: &'a dyn CallHandler<M>,
}

impl<'a, M> Next<'a, M>
where
    M: Send + 'static,
{
    /// Invoke the next stage: the following interceptor if any remain,
    /// otherwise the handler.
    pub async fn run(
        self,
        call: Box<dyn OutboundCall>,
        headers: &MetadataMap,
    ) -> Result<Box<dyn CallListener<M>>, Status> {
        match self.interceptors.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    interceptors: rest,
                    handler: self.handler,
                };
                first.intercept(call, headers, next).await
            }
            None => self.handler.start_call(call, headers).await,
        }
    }
}

/// An ordered sequence of interceptors around a handler.
pub struct InterceptorChain<M> {
    interceptors: Vec<Arc<dyn ServerInterceptor<M>>>,
}

impl<M> InterceptorChain<M>
where
    M: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// Append an interceptor; stages run in insertion order.
    pub fn with(mut self, interceptor: Arc<dyn ServerInterceptor<M>>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Run one inbound call through the chain and hand back the listener the
    /// runtime should drive.
    pub async fn dispatch(
        &self,
        call: Box<dyn OutboundCall>,
        headers: &MetadataMap,
        handler: &dyn CallHandler<M>,
    ) -> Result<Box<dyn CallListener<M>>, Status> {
        let next = Next {
            interceptors: &self.interceptors,
            handler,
        };
        next.run(call, headers).await
    }
}

impl<M> Default for InterceptorChain<M>
where
    M: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
