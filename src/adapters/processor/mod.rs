//! Payment processor adapters.

mod http_processor;
mod mock_processor;
mod wire_types;

pub use http_processor::{HttpPaymentProcessor, HttpProcessorConfig, DEFAULT_API_VERSION};
pub use mock_processor::{MethodCall, MockPaymentProcessor};
