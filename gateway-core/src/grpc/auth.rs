//! Authorization gate ahead of the rest of the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::Status;
use tonic::metadata::MetadataMap;

use super::call::OutboundCall;
use super::chain::{Next, ServerInterceptor};
use super::listener::{CallListener, NoopListener};

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny { reason: String },
}

/// External authorization collaborator. The decision may be slow (a remote
/// policy lookup); an in-flight check suspends only its own call's task.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, method: &str, headers: &MetadataMap) -> AuthDecision;
}

/// Authorizer that admits every call. Useful where an upstream service has
/// already enforced policy.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _method: &str, _headers: &MetadataMap) -> AuthDecision {
        AuthDecision::Allow
    }
}

/// Interceptor that gates every inbound call through the [`Authorizer`].
///
/// Denied calls are closed with `PERMISSION_DENIED` and never reach the rest
/// of the chain, so they are not traced as application work.
pub struct AuthGate {
    authorizer: Arc<dyn Authorizer>,
}

impl AuthGate {
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self { authorizer }
    }
}

#[async_trait]
impl<M> ServerInterceptor<M> for AuthGate
where
    M: Send + 'static,
{
    async fn intercept(
        &self,
        mut call: Box<dyn OutboundCall>,
        headers: &MetadataMap,
        next: Next<'_, M>,
    ) -> Result<Box<dyn CallListener<M>>, Status> {
        match self.authorizer.authorize(call.method_name(), headers).await {
            AuthDecision::Allow => next.run(call, headers).await,
            AuthDecision::Deny { reason } => {
                tracing::warn!(
                    method = call.method_name(),
                    reason = %reason,
                    "Call denied by authorizer"
                );
                call.close(Status::permission_denied(reason));
                Ok(Box::new(NoopListener))
            }
        }
    }
}
