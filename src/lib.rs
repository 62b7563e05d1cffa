//! # meterguard
//!
//! 面向计费第三方 API（地图、地理编码、机器学习推理）的弹性与自适应缓存层。
//!
//! Resilience and adaptive caching for calls to metered third-party APIs such
//! as geocoding, routing, places and ML inference.
//!
//! ## Overview
//!
//! Every call to a metered service costs money and can fail. `meterguard` sits
//! between application code and those services and decides, per call, whether
//! it can be answered from cache, whether it may be sent at all, and how to
//! react when it fails.
//!
//! ## Key Features
//!
//! - **Guarded Execution**: [`ApiGuard`] runs cache, rate limit, circuit breaker and retries in order
//! - **Error Taxonomy**: every failure reduces to one [`ErrorKind`] with a stable code
//! - **Circuit Breaking**: one breaker per [`ApiType`], opened lazily, no background timers
//! - **Rate Limiting**: sliding-window or token-bucket limits per api type, [`Tier`] and subject
//! - **Adaptive Caching**: TTLs learned from access patterns, with cost-savings accounting
//! - **Metrics**: pluggable [`telemetry::MetricsSink`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meterguard::transport::HttpTransport;
//! use meterguard::{ApiGuard, ApiType};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> meterguard::Result<()> {
//!     let guard = ApiGuard::new()?;
//!     let http = HttpTransport::new("https://maps.example.com/api")?;
//!     let params = json!({"address": "1600 Amphitheatre Pkwy"});
//!
//!     let response = guard
//!         .execute(ApiType::Geocoding, "geocode/json", &params, || {
//!             http.get_json("geocode/json", &params)
//!         })
//!         .await?;
//!     println!("cached: {}", response.is_cached());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`ApiGuard`] executor, builder, classification and admin operations |
//! | [`resilience`] | Circuit breakers, rate limiter and retry policy |
//! | [`cache`] | Adaptive cache, fingerprints, backends and warm-up |
//! | [`config`] | YAML configuration and validation |
//! | [`telemetry`] | Metrics sink trait and implementations |
//! | [`transport`] | reqwest-based HTTP adapter |
//! | [`types`] | Api types, tiers, requests and responses |

pub mod cache;
pub mod client;
pub mod config;
pub mod error_kind;
pub mod resilience;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod utils;

pub use client::{ApiGuard, ApiGuardBuilder, ApiStatus, CallOptions};
pub use config::GuardConfig;
pub use error_kind::ErrorKind;
pub use types::{ApiType, CallFailure, RawResponse, Response, Tier};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{ApiError, Error, ErrorContext};
