//! gateway-core: request-interception infrastructure for gRPC gateways.
pub mod config;
pub mod error;
pub mod grpc;
pub mod observability;

pub use async_trait;
pub use tokio;
pub use tonic;
pub use tracing;
