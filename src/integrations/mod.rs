//! External service integrations.

pub mod services {
    pub use crate::services::*;
}

pub mod cache_validator {
    pub use crate::cache_validator::*;
}

pub mod circuit_breaker {
    pub use crate::circuit_breaker::*;
}
