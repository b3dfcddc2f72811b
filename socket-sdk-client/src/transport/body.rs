//! Request body type for the HTTP transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;

use crate::ClientError;

pin_project! {
    /// Body of an outgoing API request.
    ///
    /// - `Empty` for GET and DELETE calls
    /// - `Full` for JSON payloads
    /// - `Streaming` for multipart uploads, which read files chunk by chunk
    #[project = TransportBodyProj]
    pub enum TransportBody {
        Empty,
        Full {
            data: Option<Bytes>,
        },
        Streaming {
            #[pin]
            stream: Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>,
            len: Option<u64>,
        },
    }
}

impl TransportBody {
    pub fn empty() -> Self {
        TransportBody::Empty
    }

    pub fn full(data: Bytes) -> Self {
        TransportBody::Full { data: Some(data) }
    }

    /// Create a streaming body, optionally with its exact length in bytes.
    pub fn streaming<S>(stream: S, len: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        TransportBody::Streaming {
            stream: Box::pin(stream),
            len,
        }
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            TransportBodyProj::Empty => Poll::Ready(None),
            TransportBodyProj::Full { data } => Poll::Ready(data.take().map(|d| Ok(Frame::data(d)))),
            TransportBodyProj::Streaming { stream, .. } => match stream.poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => Poll::Ready(Some(Ok(Frame::data(data)))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            TransportBody::Empty => true,
            TransportBody::Full { data } => data.is_none(),
            TransportBody::Streaming { .. } => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            TransportBody::Empty => SizeHint::with_exact(0),
            TransportBody::Full { data } => {
                SizeHint::with_exact(data.as_ref().map_or(0, |d| d.len() as u64))
            }
            TransportBody::Streaming { len: Some(len), .. } => SizeHint::with_exact(*len),
            TransportBody::Streaming { len: None, .. } => SizeHint::default(),
        }
    }
}

impl Default for TransportBody {
    fn default() -> Self {
        TransportBody::Empty
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportBody::Empty => write!(f, "TransportBody::Empty"),
            TransportBody::Full { data } => f
                .debug_struct("TransportBody::Full")
                .field("data_len", &data.as_ref().map(|d| d.len()))
                .finish(),
            TransportBody::Streaming { len, .. } => f
                .debug_struct("TransportBody::Streaming")
                .field("len", len)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_empty_body() {
        let mut body = TransportBody::empty();
        assert!(body.is_end_stream());

        let collected = Pin::new(&mut body).collect().await.unwrap();
        assert!(collected.to_bytes().is_empty());
    }

    #[tokio::test]
    async fn test_full_body() {
        let data = Bytes::from_static(b"{\"components\":[]}");
        let mut body = TransportBody::full(data.clone());
        assert_eq!(body.size_hint().exact(), Some(data.len() as u64));

        let collected = Pin::new(&mut body).collect().await.unwrap();
        assert_eq!(collected.to_bytes(), data);
    }

    #[tokio::test]
    async fn test_streaming_body_with_length() {
        let chunks = vec![
            Ok(Bytes::from("--boundary\r\n")),
            Ok(Bytes::from("file contents")),
            Ok(Bytes::from("\r\n--boundary--\r\n")),
        ];
        let mut body = TransportBody::streaming(futures::stream::iter(chunks), Some(41));
        assert_eq!(body.size_hint().exact(), Some(41));

        let collected = Pin::new(&mut body).collect().await.unwrap();
        assert_eq!(
            collected.to_bytes(),
            Bytes::from("--boundary\r\nfile contents\r\n--boundary--\r\n")
        );
    }

    #[tokio::test]
    async fn test_streaming_body_error() {
        let chunks = vec![
            Ok(Bytes::from("partial")),
            Err(ClientError::Io("disk gone".into())),
        ];
        let mut body = TransportBody::streaming(futures::stream::iter(chunks), None);

        let err = Pin::new(&mut body).collect().await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
