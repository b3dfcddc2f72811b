//! Description of a single API request, before client defaults are applied.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde_json::{Map, Value};

use super::multipart::MultipartBody;
use crate::ClientError;
use crate::transport::TransportBody;

/// Body of an [`ApiRequest`].
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Pre-serialized JSON.
    Json(Bytes),
    Multipart(MultipartBody),
}

impl RequestBody {
    /// Content type to announce, if the body has one.
    pub fn content_type(&self) -> Option<String> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(_) => Some("application/json".to_owned()),
            RequestBody::Multipart(form) => Some(form.content_type()),
        }
    }

    pub fn content_length(&self) -> u64 {
        match self {
            RequestBody::Empty => 0,
            RequestBody::Json(bytes) => bytes.len() as u64,
            RequestBody::Multipart(form) => form.content_length(),
        }
    }

    /// A fresh transport body. Called once per attempt.
    pub(crate) fn to_transport_body(&self) -> TransportBody {
        match self {
            RequestBody::Empty => TransportBody::empty(),
            RequestBody::Json(bytes) => TransportBody::full(bytes.clone()),
            RequestBody::Multipart(form) => form.to_body(),
        }
    }
}

/// A request against the Socket API.
///
/// The path is relative to the client's base URL.
///
/// # Example
///
/// ```
/// use socket_sdk_client::ApiRequest;
/// use serde_json::json;
///
/// let request = ApiRequest::post("purl")
///     .query(&json!({ "alerts": true, "compact": null }))?
///     .json(&json!({ "components": [{ "purl": "pkg:npm/lodash@4.17.21" }] }))?;
///
/// assert_eq!(request.query_string(), Some("alerts=true"));
/// # Ok::<(), socket_sdk_client::ClientError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Set the query string from a serializable map or struct.
    ///
    /// Fields that serialize to `null` (including `None`) are omitted. An
    /// empty result leaves the URL without a query string.
    pub fn query<Q: Serialize + ?Sized>(mut self, query: &Q) -> Result<Self, ClientError> {
        self.query = encode_query(query)?;
        Ok(self)
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ClientError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ClientError::Encode(format!("failed to encode JSON body: {e}")))?;
        self.body = RequestBody::Json(Bytes::from(bytes));
        Ok(self)
    }

    pub fn multipart(mut self, form: MultipartBody) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Add a header to this request.
    pub fn header<K, V>(mut self, name: K, value: V) -> Result<Self, ClientError>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name
            .try_into()
            .map_err(|_| ClientError::InvalidRequest("invalid header name".into()))?;
        let value = value
            .try_into()
            .map_err(|_| ClientError::InvalidRequest(format!("invalid value for header {name}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub(crate) fn into_parts(self) -> (Method, String, Option<String>, HeaderMap, RequestBody) {
        (self.method, self.path, self.query, self.headers, self.body)
    }
}

/// Encode query parameters, dropping nulls.
pub(crate) fn encode_query<Q: Serialize + ?Sized>(query: &Q) -> Result<Option<String>, ClientError> {
    let value = serde_json::to_value(query)
        .map_err(|e| ClientError::Encode(format!("failed to encode query: {e}")))?;

    let params: Map<String, Value> = match value {
        Value::Null => return Ok(None),
        Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => {
            return Err(ClientError::InvalidRequest(
                "query parameters must serialize to a map".into(),
            ));
        }
    };

    if params.is_empty() {
        return Ok(None);
    }

    serde_qs::to_string(&params)
        .map(Some)
        .map_err(|e| ClientError::Encode(format!("failed to encode query: {e}")))
}

/// Everything except RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode one path segment, including any `/` it contains.
pub(crate) fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct ScanQuery<'a> {
        repo: &'a str,
        branch: Option<&'a str>,
        make_default_branch: bool,
    }

    #[test]
    fn test_query_skips_none() {
        let query = ScanQuery {
            repo: "web",
            branch: None,
            make_default_branch: true,
        };
        assert_eq!(
            encode_query(&query).unwrap().as_deref(),
            Some("make_default_branch=true&repo=web")
        );
    }

    #[test]
    fn test_query_escapes_values() {
        let encoded = encode_query(&json!({ "commit_message": "fix: a&b = c" })).unwrap();
        let encoded = encoded.unwrap();
        assert!(encoded.starts_with("commit_message="));
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains("a&b"));
    }

    #[test]
    fn test_query_empty_and_null() {
        assert_eq!(encode_query(&json!({})).unwrap(), None);
        assert_eq!(encode_query(&json!({ "a": null })).unwrap(), None);
        assert_eq!(encode_query(&()).unwrap(), None);
    }

    #[test]
    fn test_query_rejects_non_map() {
        let err = encode_query(&json!(["a", "b"])).unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn test_json_body() {
        let request = ApiRequest::post("purl")
            .json(&json!({ "components": [] }))
            .unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.body().content_type().as_deref(), Some("application/json"));
        assert_eq!(request.body().content_length(), 17);
    }

    #[test]
    fn test_invalid_header() {
        let err = ApiRequest::get("quota").header("x-bad", "a\r\nb").unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("acme-corp"), "acme-corp");
        assert_eq!(encode_path_segment("my repo/x"), "my%20repo%2Fx");
        assert_eq!(encode_path_segment("caf\u{e9}"), "caf%C3%A9");
        assert_eq!(encode_path_segment("v1.2_rc~1"), "v1.2_rc~1");
        assert_eq!(encode_path_segment("50%"), "50%25");
    }
}
