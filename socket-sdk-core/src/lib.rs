//! Core types for the Socket API client.
//!
//! This crate holds the transport-independent pieces shared by
//! `socket-sdk-client` and anything that consumes its results.
//!
//! ## Modules
//!
//! - [`result`]: The [`ApiResult`] union returned by every API call
//! - [`error`]: [`ErrorDescription`] and the error-body extractor
//! - [`ndjson`]: Sans-IO newline-delimited JSON line decoder

mod error;
mod ndjson;
mod result;

pub use error::*;
pub use ndjson::*;
pub use result::*;
