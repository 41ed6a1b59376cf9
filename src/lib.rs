//! Caching, rate-limited reverse proxy for manga scan page images.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
