//! Response-side decoding:
//! - [`NdjsonStream`]: Lazy NDJSON item stream over a response body

mod ndjson;

pub(crate) use ndjson::body_to_stream;
pub use ndjson::{NdjsonError, NdjsonResponse, NdjsonStream, ResponseBodyStream};
