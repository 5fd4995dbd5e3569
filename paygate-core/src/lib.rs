// Core library for the paygate payment layer
// Request model, middleware chain, outcome helpers and resilience patterns

pub mod error;
pub mod extensions;
pub mod http;
pub mod middleware;
pub mod outcome;
pub mod resilience;

// Re-export commonly used types
pub use error::*;
pub use extensions::*;
pub use http::*;
pub use middleware::*;
pub use outcome::{Fault, Rule};
