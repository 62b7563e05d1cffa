//! HTTP adapter producing [`RawResponse`](crate::types::RawResponse) values for the guard.

pub mod http;

pub use http::{ApiKeyPlacement, HttpTransport};
