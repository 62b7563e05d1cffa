//! 类型模块：定义受保护 API 调用的核心数据类型。
//!
//! # Types Module
//!
//! Core value types shared by every layer of the guard.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ApiType`] | Closed set of metered third-party services |
//! | [`Tier`] | Role-based rate-limit tier |
//! | [`RawResponse`] | What an underlying call produces on completion |
//! | [`CallFailure`] | What an underlying call produces when it cannot complete |
//! | [`Response`] | What the guard hands back to callers |

pub mod api_type;
pub mod response;
pub mod tier;

pub use api_type::ApiType;
pub use response::{CacheMetadata, CallFailure, RawResponse, Response};
pub use tier::Tier;
