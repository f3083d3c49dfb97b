//! Utilities
//!
//! Token-bucket rate limiting, output retention and pumping, and the shared
//! cancellation token.

pub mod cancel;
pub mod output;
pub mod rate_limit;
pub mod ring_buffer;
