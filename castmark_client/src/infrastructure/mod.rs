//! Error types and fault tolerance shared by the commands

pub mod circuit_breaker;
pub mod error;

pub use circuit_breaker::CircuitBreaker;
pub use error::{invalid_input, Error};
