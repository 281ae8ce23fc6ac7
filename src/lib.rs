//! Lifestream library
//!
//! Exposes the aggregation, caching and HTTP modules for the server
//! binary and for integration tests.

pub mod cache;
pub mod config;
pub mod feed;
pub mod fetch;
pub mod server;
pub mod sources;
