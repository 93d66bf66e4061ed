pub mod correlation;
pub mod logging;

pub use correlation::{CorrelationContext, current, scope, with_correlation};
pub use logging::init_tracing;
