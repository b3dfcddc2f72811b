//! `multipart/form-data` bodies for manifest and SBOM uploads.
//!
//! [`MultipartForm`] collects parts in insertion order. [`MultipartForm::build`]
//! checks every file before anything is sent, picks a boundary that occurs in
//! none of the parts, and returns a [`MultipartBody`]. The body streams files
//! from disk in fixed-size chunks each time it is sent, so uploads of any size
//! use bounded memory and can be replayed on retry.

use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use rand::Rng;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::ClientError;
use crate::transport::TransportBody;

const BOUNDARY_PREFIX: &str = "----SocketSdkBoundary";
const BOUNDARY_TOKEN_LEN: usize = 32;
const MAX_BOUNDARY_ATTEMPTS: usize = 8;
const CHUNK_SIZE: usize = 64 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";
const APPLICATION_JSON: &str = "application/json";

#[derive(Debug)]
enum PartSource {
    Bytes(Bytes),
    File(PathBuf),
}

#[derive(Debug)]
struct PartSpec {
    name: String,
    filename: Option<String>,
    content_type: String,
    source: PartSource,
}

/// Builder for a multipart upload.
///
/// # Example
///
/// ```ignore
/// use socket_sdk_client::MultipartForm;
///
/// let form = MultipartForm::new()
///     .files_relative_to("/work/app", ["package.json", "package-lock.json"])?
///     .json("issueRules", &rules)?
///     .build()
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct MultipartForm {
    parts: Vec<PartSpec>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file part. The filename sent is the last component of `path`.
    pub fn file(self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        self.push(name.into(), filename, OCTET_STREAM.to_owned(), PartSource::File(path))
    }

    /// Add a file part with an explicit filename.
    pub fn file_with_name(
        self,
        name: impl Into<String>,
        filename: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.push(
            name.into(),
            Some(filename.into()),
            OCTET_STREAM.to_owned(),
            PartSource::File(path.into()),
        )
    }

    /// Add an in-memory part.
    pub fn bytes(
        self,
        name: impl Into<String>,
        filename: Option<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        self.push(
            name.into(),
            filename,
            content_type.into(),
            PartSource::Bytes(content.into()),
        )
    }

    /// Add a plain text field.
    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bytes(
            name,
            None,
            "text/plain; charset=utf-8",
            Bytes::from(value.into()),
        )
    }

    /// Add a JSON side-channel field with `Content-Type: application/json`.
    pub fn json<T: Serialize + ?Sized>(
        self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self, ClientError> {
        let name = name.into();
        let body = serde_json::to_vec(value)
            .map_err(|e| ClientError::Encode(format!("failed to encode part {name:?}: {e}")))?;
        Ok(self.push(
            name,
            None,
            APPLICATION_JSON.to_owned(),
            PartSource::Bytes(Bytes::from(body)),
        ))
    }

    /// Add one file part per path, named by its path relative to `base_dir`.
    ///
    /// Relative paths are resolved against `base_dir`. Field names always use
    /// `/` as the separator. Paths outside `base_dir` are rejected.
    pub fn files_relative_to<I, P>(
        mut self,
        base_dir: impl AsRef<Path>,
        paths: I,
    ) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let base = base_dir.as_ref();
        for path in paths {
            let path = path.as_ref();
            let full = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            };

            let relative = full
                .strip_prefix(base)
                .ok()
                .filter(|rel| {
                    rel.components().next().is_some()
                        && rel.components().all(|c| matches!(c, Component::Normal(_)))
                })
                .ok_or_else(|| {
                    ClientError::InvalidUpload(format!(
                        "{} is not inside {}",
                        full.display(),
                        base.display()
                    ))
                })?;

            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let filename = full
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());

            self = self.push(name, filename, OCTET_STREAM.to_owned(), PartSource::File(full));
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Validate every file and choose a boundary.
    ///
    /// Fails with [`ClientError::InvalidUpload`] if the form is empty or any
    /// file is missing, not a regular file, or unreadable. No request is made
    /// in that case.
    pub async fn build(self) -> Result<MultipartBody, ClientError> {
        self.build_with_boundaries(std::iter::repeat_with(random_boundary))
            .await
    }

    pub(crate) async fn build_with_boundaries<I>(
        self,
        candidates: I,
    ) -> Result<MultipartBody, ClientError>
    where
        I: IntoIterator<Item = String>,
    {
        if self.parts.is_empty() {
            return Err(ClientError::InvalidUpload(
                "multipart form has no parts".into(),
            ));
        }

        let mut parts = Vec::with_capacity(self.parts.len());
        for spec in self.parts {
            let content = match spec.source {
                PartSource::Bytes(bytes) => PartContent::Bytes(bytes),
                PartSource::File(path) => {
                    let len = check_file(&path).await?;
                    PartContent::File { path, len }
                }
            };
            parts.push(MultipartPart {
                name: spec.name,
                filename: spec.filename,
                content_type: spec.content_type,
                content,
            });
        }

        for boundary in candidates.into_iter().take(MAX_BOUNDARY_ATTEMPTS) {
            if !boundary_collides(&boundary, &parts).await? {
                return Ok(MultipartBody::new(boundary, parts));
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(%boundary, "multipart boundary found in content, regenerating");
        }

        Err(ClientError::InvalidUpload(
            "could not choose a multipart boundary absent from the upload content".into(),
        ))
    }

    fn push(
        mut self,
        name: String,
        filename: Option<String>,
        content_type: String,
        source: PartSource,
    ) -> Self {
        self.parts.push(PartSpec {
            name,
            filename,
            content_type,
            source,
        });
        self
    }
}

/// Content of a validated part.
#[derive(Debug, Clone)]
pub enum PartContent {
    Bytes(Bytes),
    /// A file streamed from disk; `len` is its size when validated.
    File { path: PathBuf, len: u64 },
}

impl PartContent {
    pub fn len(&self) -> u64 {
        match self {
            PartContent::Bytes(bytes) => bytes.len() as u64,
            PartContent::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub content: PartContent,
}

/// A validated multipart body, cheap to clone and replayable.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    parts: Arc<[MultipartPart]>,
    headers: Arc<[Bytes]>,
    content_length: u64,
}

impl MultipartBody {
    fn new(boundary: String, parts: Vec<MultipartPart>) -> Self {
        let headers: Vec<Bytes> = parts.iter().map(|p| part_header(&boundary, p)).collect();
        let content_length = headers
            .iter()
            .zip(&parts)
            .map(|(header, part)| header.len() as u64 + part.content.len() + 2)
            .sum::<u64>()
            + closing_delimiter(&boundary).len() as u64;

        Self {
            boundary,
            parts: parts.into(),
            headers: headers.into(),
            content_length,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact size of the encoded body in bytes.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// A fresh streaming body. Files are opened when the body is first polled.
    pub fn to_body(&self) -> TransportBody {
        let mut segments = Vec::with_capacity(self.parts.len() * 3 + 1);
        for (header, part) in self.headers.iter().zip(self.parts.iter()) {
            segments.push(Segment::Bytes(header.clone()));
            match &part.content {
                PartContent::Bytes(bytes) if bytes.is_empty() => {}
                PartContent::Bytes(bytes) => segments.push(Segment::Bytes(bytes.clone())),
                PartContent::File { path, len } => segments.push(Segment::File {
                    path: path.clone(),
                    len: *len,
                }),
            }
            segments.push(Segment::Bytes(Bytes::from_static(b"\r\n")));
        }
        segments.push(Segment::Bytes(Bytes::from(closing_delimiter(&self.boundary))));

        let stream = stream::iter(segments).flat_map(|segment| match segment {
            Segment::Bytes(bytes) => stream::once(async move { Ok::<_, ClientError>(bytes) }).boxed(),
            Segment::File { path, len } => file_chunks(path, len),
        });
        TransportBody::streaming(stream, Some(self.content_length))
    }
}

enum Segment {
    Bytes(Bytes),
    File { path: PathBuf, len: u64 },
}

fn random_boundary() -> String {
    let token: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(BOUNDARY_TOKEN_LEN)
        .map(char::from)
        .collect();
    format!("{BOUNDARY_PREFIX}{token}")
}

fn closing_delimiter(boundary: &str) -> String {
    format!("--{boundary}--\r\n")
}

fn part_header(boundary: &str, part: &MultipartPart) -> Bytes {
    let mut header = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
        escape_quoted(&part.name)
    );
    if let Some(filename) = &part.filename {
        let _ = write!(header, "; filename=\"{}\"", escape_quoted(filename));
    }
    let _ = write!(
        header,
        "\r\nContent-Type: {}\r\n\r\n",
        part.content_type.replace(['\r', '\n'], " ")
    );
    Bytes::from(header)
}

/// Escape a `Content-Disposition` parameter value.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

async fn check_file(path: &Path) -> Result<u64, ClientError> {
    let unreadable =
        |e: std::io::Error| ClientError::InvalidUpload(format!("cannot read {}: {e}", path.display()));

    let metadata = tokio::fs::metadata(path).await.map_err(unreadable)?;
    if !metadata.is_file() {
        return Err(ClientError::InvalidUpload(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    File::open(path).await.map_err(unreadable)?;
    Ok(metadata.len())
}

async fn boundary_collides(boundary: &str, parts: &[MultipartPart]) -> Result<bool, ClientError> {
    let needle = boundary.as_bytes();
    for part in parts {
        let in_headers = contains(part.name.as_bytes(), needle)
            || part
                .filename
                .as_deref()
                .is_some_and(|f| contains(f.as_bytes(), needle));
        if in_headers {
            return Ok(true);
        }

        let in_content = match &part.content {
            PartContent::Bytes(bytes) => contains(bytes, needle),
            PartContent::File { path, .. } => {
                let file = File::open(path).await.map_err(|e| {
                    ClientError::InvalidUpload(format!("cannot read {}: {e}", path.display()))
                })?;
                reader_contains(file, needle).await.map_err(|e| {
                    ClientError::InvalidUpload(format!("cannot read {}: {e}", path.display()))
                })?
            }
        };
        if in_content {
            return Ok(true);
        }
    }
    Ok(false)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Search a reader chunk by chunk, keeping `needle.len() - 1` bytes of
/// overlap so matches spanning chunks are found.
async fn reader_contains<R>(mut reader: R, needle: &[u8]) -> std::io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let keep = needle.len().saturating_sub(1);
    let mut window: Vec<u8> = Vec::with_capacity(CHUNK_SIZE + keep);
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(false);
        }
        window.extend_from_slice(&chunk[..n]);
        if contains(&window, needle) {
            return Ok(true);
        }
        let excess = window.len().saturating_sub(keep);
        window.drain(..excess);
    }
}

enum FileChunks {
    Pending(PathBuf, u64),
    Reading {
        path: PathBuf,
        file: File,
        remaining: u64,
    },
}

/// Stream a file in chunks of at most [`CHUNK_SIZE`] bytes.
///
/// Exactly `len` bytes are produced; a file that shrank since validation is
/// an error rather than a short body.
fn file_chunks(path: PathBuf, len: u64) -> BoxStream<'static, Result<Bytes, ClientError>> {
    stream::try_unfold(FileChunks::Pending(path, len), |state| async move {
        let (path, mut file, remaining) = match state {
            FileChunks::Pending(path, len) => {
                let file = File::open(&path).await.map_err(|e| {
                    ClientError::Io(format!("failed to open {}: {e}", path.display()))
                })?;
                (path, file, len)
            }
            FileChunks::Reading {
                path,
                file,
                remaining,
            } => (path, file, remaining),
        };

        if remaining == 0 {
            return Ok(None);
        }

        let mut buf = vec![0u8; remaining.min(CHUNK_SIZE as u64) as usize];
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| ClientError::Io(format!("failed to read {}: {e}", path.display())))?;
        if n == 0 {
            return Err(ClientError::Io(format!(
                "{} shrank by {remaining} bytes during upload",
                path.display()
            )));
        }
        buf.truncate(n);

        let next = FileChunks::Reading {
            path,
            file,
            remaining: remaining - n as u64,
        };
        Ok(Some((Bytes::from(buf), next)))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::io::Write;

    async fn encode(body: &MultipartBody) -> Bytes {
        body.to_body().collect().await.unwrap().to_bytes()
    }

    fn position(haystack: &[u8], needle: &[u8]) -> usize {
        haystack
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap_or_else(|| panic!("{:?} not found", String::from_utf8_lossy(needle)))
    }

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_parts_in_insertion_order() {
        let file = temp_file(b"{\"name\":\"web\"}");

        let body = MultipartForm::new()
            .bytes("A", Some("a.txt".into()), "text/plain", "alpha")
            .file("B", file.path())
            .json("C", &serde_json::json!({"rule": "warn"}))
            .unwrap()
            .build()
            .await
            .unwrap();

        let encoded = encode(&body).await;
        let a = position(&encoded, b"name=\"A\"");
        let b = position(&encoded, b"name=\"B\"");
        let c = position(&encoded, b"name=\"C\"");
        assert!(a < b && b < c);

        assert_eq!(encoded.len() as u64, body.content_length());
        assert!(encoded.ends_with(format!("--{}--\r\n", body.boundary()).as_bytes()));
        assert!(encoded.starts_with(format!("--{}\r\n", body.boundary()).as_bytes()));
    }

    #[tokio::test]
    async fn test_exact_encoding() {
        let body = MultipartForm::new()
            .bytes("manifest", Some("package.json".into()), OCTET_STREAM, "{}")
            .build_with_boundaries(["XYZ".to_owned()])
            .await
            .unwrap();

        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"manifest\"; filename=\"package.json\"\r\n\
            Content-Type: application/octet-stream\r\n\
            \r\n\
            {}\r\n\
            --XYZ--\r\n";
        assert_eq!(encode(&body).await, Bytes::from(expected));
        assert_eq!(body.content_type(), "multipart/form-data; boundary=XYZ");
    }

    #[tokio::test]
    async fn test_json_part_content_type() {
        let body = MultipartForm::new()
            .json("issueRules", &serde_json::json!({"malware": true}))
            .unwrap()
            .build()
            .await
            .unwrap();

        let part = &body.parts()[0];
        assert_eq!(part.content_type, "application/json");
        let encoded = encode(&body).await;
        position(&encoded, b"Content-Type: application/json\r\n\r\n{\"malware\":true}\r\n");
    }

    #[tokio::test]
    async fn test_random_boundary_shape() {
        let boundary = random_boundary();
        assert!(boundary.starts_with(BOUNDARY_PREFIX));
        assert_eq!(boundary.len(), BOUNDARY_PREFIX.len() + BOUNDARY_TOKEN_LEN);
        assert_ne!(boundary, random_boundary());
    }

    #[tokio::test]
    async fn test_boundary_collision_regenerates() {
        let file = temp_file(b"prefix FIRST suffix");
        let body = MultipartForm::new()
            .bytes("a", None, "text/plain", "contains SECOND here")
            .file("b", file.path())
            .build_with_boundaries(["FIRST", "SECOND", "THIRD"].map(String::from))
            .await
            .unwrap();

        assert_eq!(body.boundary(), "THIRD");
    }

    #[tokio::test]
    async fn test_boundary_collision_exhausted() {
        let err = MultipartForm::new()
            .bytes("a", None, "text/plain", "AAAA")
            .build_with_boundaries(std::iter::repeat("AA".to_owned()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpload(_)));
    }

    #[tokio::test]
    async fn test_reader_contains_across_chunks() {
        let mut data = vec![b'x'; CHUNK_SIZE - 3];
        data.extend_from_slice(b"NEEDLE");
        data.extend(std::iter::repeat_n(b'y', 100));

        assert!(reader_contains(&data[..], b"NEEDLE").await.unwrap());
        assert!(!reader_contains(&data[..], b"NEEDLES").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let err = MultipartForm::new()
            .text("repo", "web")
            .file("lock", dir.path().join("missing.lock"))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpload(msg) if msg.contains("missing.lock")));
    }

    #[tokio::test]
    async fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = MultipartForm::new()
            .file("dir", dir.path())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpload(msg) if msg.contains("not a regular file")));
    }

    #[tokio::test]
    async fn test_empty_form_rejected() {
        let err = MultipartForm::new().build().await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpload(_)));
    }

    #[tokio::test]
    async fn test_files_relative_to() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages/api")).unwrap();
        std::fs::write(dir.path().join("package.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("packages/api/package.json"), b"{}").unwrap();

        let form = MultipartForm::new()
            .files_relative_to(
                dir.path(),
                [
                    PathBuf::from("package.json"),
                    dir.path().join("packages/api/package.json"),
                ],
            )
            .unwrap();
        let body = form.build().await.unwrap();

        let names: Vec<&str> = body.parts().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["package.json", "packages/api/package.json"]);
        assert_eq!(body.parts()[1].filename.as_deref(), Some("package.json"));
    }

    #[tokio::test]
    async fn test_files_outside_base_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = MultipartForm::new()
            .files_relative_to(dir.path(), ["../etc/passwd"])
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpload(_)));
    }

    #[tokio::test]
    async fn test_large_file_streams_in_chunks() {
        let contents: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let file = temp_file(&contents);

        let body = MultipartForm::new()
            .file("sbom", file.path())
            .build_with_boundaries(["----b".to_owned()])
            .await
            .unwrap();

        let mut frames = 0;
        let mut encoded = Vec::new();
        let mut transport = body.to_body();
        while let Some(frame) = transport.frame().await {
            let data = frame.unwrap().into_data().unwrap();
            assert!(data.len() <= CHUNK_SIZE);
            encoded.extend_from_slice(&data);
            frames += 1;
        }
        assert!(frames >= 4);
        assert_eq!(encoded.len() as u64, body.content_length());
        let start = position(&encoded, b"\r\n\r\n") + 4;
        assert_eq!(&encoded[start..start + contents.len()], &contents[..]);

        // Replaying produces the same bytes.
        assert_eq!(encode(&body).await, Bytes::from(encoded));
    }

    #[tokio::test]
    async fn test_shrunk_file_is_an_error() {
        let file = temp_file(b"0123456789");
        let body = MultipartForm::new()
            .file("f", file.path())
            .build()
            .await
            .unwrap();
        std::fs::write(file.path(), b"0123").unwrap();

        let err = body.to_body().collect().await.unwrap_err();
        assert!(matches!(err, ClientError::Io(msg) if msg.contains("shrank")));
    }

    #[test]
    fn test_escape_quoted() {
        assert_eq!(escape_quoted("a\"b\r\nc"), "a%22b%0D%0Ac");
    }
}
