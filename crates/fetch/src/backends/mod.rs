//! Fetcher backends.

pub mod http;
