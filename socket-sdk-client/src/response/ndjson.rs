//! Lazy NDJSON response streams.
//!
//! [`NdjsonStream`] decodes a byte stream into one item per line. Chunks are
//! pulled from the body only when no decoded item is waiting, so a slow
//! consumer applies backpressure all the way to the socket.
//!
//! # Cancellation
//!
//! Dropping the stream closes the underlying response body.
//!
//! # Timeouts
//!
//! With an idle timeout set, the stream gives up once it has waited that long
//! for the next chunk. Time spent while the consumer is not polling does not
//! count.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use socket_sdk_core::{LineDecoder, LineError};

use crate::ClientError;
use crate::error::error_chain;

/// Boxed response body as a stream of chunks.
pub type ResponseBodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// NDJSON stream over a response body, as returned by the client.
pub type NdjsonResponse<T> = NdjsonStream<ResponseBodyStream, T>;

/// Error for a single item of an [`NdjsonStream`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum NdjsonError {
    /// One line was not valid JSON for the item type. The stream continues.
    #[error(transparent)]
    Line(#[from] LineError),

    /// The body failed mid-stream. This is the final item.
    #[error("stream interrupted: {0}")]
    Transport(ClientError),
}

impl NdjsonError {
    pub fn is_line_error(&self) -> bool {
        matches!(self, NdjsonError::Line(_))
    }
}

/// Stream of NDJSON items decoded from chunks of bytes.
///
/// Yields `Ok(item)` per parsed line and `Err(NdjsonError::Line)` per
/// malformed line, in line order. A transport failure or an expired idle
/// timeout yields one `Err(NdjsonError::Transport)` and ends the stream; the
/// incomplete trailing line, if any, is discarded.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut artifacts = client
///     .batch_package_fetch(&components, &BatchPackageQuery::default())
///     .await?
///     .into_result()?;
///
/// while let Some(item) = artifacts.next().await {
///     match item {
///         Ok(artifact) => println!("{}", artifact["purl"]),
///         Err(e) if e.is_line_error() => eprintln!("skipping: {e}"),
///         Err(e) => return Err(e.into()),
///     }
/// }
/// ```
pub struct NdjsonStream<S, T> {
    inner: S,
    decoder: LineDecoder,
    /// The inner stream returned `None` or an error, or the idle timeout fired.
    exhausted: bool,
    idle_timeout: Option<Duration>,
    /// Armed while waiting on `inner`, cleared when a chunk arrives.
    idle: Option<Pin<Box<tokio::time::Sleep>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T> NdjsonStream<S, T> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: LineDecoder::new(),
            exhausted: false,
            idle_timeout: None,
            idle: None,
            _marker: PhantomData,
        }
    }

    /// End the stream with [`ClientError::Timeout`] when no chunk arrives
    /// within `timeout` of asking for one. `None` waits indefinitely.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self.idle = None;
        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Whether every item has been yielded.
    pub fn is_finished(&self) -> bool {
        self.exhausted && !self.decoder.has_pending()
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, T> NdjsonStream<S, T>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin,
    T: DeserializeOwned,
{
    /// Consume the rest of the stream without keeping items.
    ///
    /// Returns the number of items that decoded successfully.
    pub async fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Some(result) = self.next().await {
            if result.is_ok() {
                count += 1;
            }
        }
        count
    }
}

impl<S, T> Stream for NdjsonStream<S, T>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin,
    T: DeserializeOwned,
{
    type Item = Result<T, NdjsonError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(item) = this.decoder.next_value::<T>() {
                return Poll::Ready(Some(item.map_err(NdjsonError::Line)));
            }

            if this.exhausted {
                return Poll::Ready(None);
            }

            let polled = Pin::new(&mut this.inner).poll_next(cx);
            if polled.is_ready() {
                this.idle = None;
            }

            match polled {
                Poll::Ready(Some(Ok(chunk))) => this.decoder.push(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    this.exhausted = true;
                    return Poll::Ready(Some(Err(NdjsonError::Transport(e))));
                }
                Poll::Ready(None) => {
                    this.exhausted = true;
                    this.decoder.finish();
                }
                Poll::Pending => {
                    let Some(limit) = this.idle_timeout else {
                        return Poll::Pending;
                    };
                    let idle = this
                        .idle
                        .get_or_insert_with(|| Box::pin(tokio::time::sleep(limit)));
                    if idle.as_mut().poll(cx).is_pending() {
                        return Poll::Pending;
                    }

                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        timeout_ms = limit.as_millis() as u64,
                        "ndjson stream stalled"
                    );

                    this.idle = None;
                    this.exhausted = true;
                    let timeout = ClientError::Timeout(limit);
                    return Poll::Ready(Some(Err(NdjsonError::Transport(timeout))));
                }
            }
        }
    }
}

impl<S, T> std::fmt::Debug for NdjsonStream<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdjsonStream")
            .field("exhausted", &self.exhausted)
            .field("idle_timeout", &self.idle_timeout)
            .field("buffered", &self.decoder.buffered_len())
            .finish_non_exhaustive()
    }
}

/// Turn a hyper response body into a stream of non-empty data chunks.
pub(crate) fn body_to_stream(body: hyper::body::Incoming) -> ResponseBodyStream {
    use http_body_util::BodyExt;

    Box::pin(
        futures::stream::unfold(body, |mut body| async move {
            match body.frame().await {
                // Trailers carry no data.
                Some(Ok(frame)) => Some((Ok(frame.into_data().unwrap_or_default()), body)),
                Some(Err(e)) => Some((
                    Err(ClientError::Transport(format!(
                        "stream error: {}",
                        error_chain(&e)
                    ))),
                    body,
                )),
                None => None,
            }
        })
        .filter(|result| {
            futures::future::ready(match result {
                Ok(bytes) => !bytes.is_empty(),
                Err(_) => true,
            })
        }),
    )
}
