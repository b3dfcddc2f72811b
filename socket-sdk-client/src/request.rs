//! Request construction:
//! - [`ApiRequest`]: Method, path, query, headers and body of one call
//! - [`MultipartForm`] / [`MultipartBody`]: Streaming file uploads

mod api_request;
mod multipart;

pub use api_request::{ApiRequest, RequestBody};
pub(crate) use api_request::encode_path_segment;
pub use multipart::{MultipartBody, MultipartForm, MultipartPart, PartContent};
