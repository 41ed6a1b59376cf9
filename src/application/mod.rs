//! Application services: the proxy core.

pub mod access;
pub mod bandwidth;
pub mod error;
pub mod limiter;
pub mod origin;
pub mod resolver;
