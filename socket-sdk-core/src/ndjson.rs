//! Newline-delimited JSON (NDJSON) line decoding.
//!
//! [`LineDecoder`] is a sans-IO decoder: callers feed it raw byte chunks as
//! they arrive with [`push`](LineDecoder::push), signal the end of input with
//! [`finish`](LineDecoder::finish), and pull decoded values with
//! [`next_value`](LineDecoder::next_value). Chunks may split lines (or UTF-8
//! sequences) anywhere; the decoded sequence depends only on the
//! concatenated input.
//!
//! Line policy:
//! - Lines are separated by `\n`; surrounding whitespace (including `\r`) is trimmed.
//! - Blank lines are skipped without producing an item.
//! - A line that fails to parse produces a [`LineError`] and decoding
//!   continues with the next line.
//! - A non-blank trailing fragment without a final `\n` is decoded on
//!   [`finish`](LineDecoder::finish).

use std::collections::VecDeque;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;

/// A single NDJSON line that could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid JSON on line {line}: {message}")]
pub struct LineError {
    /// 1-based line number within the stream.
    pub line: usize,
    /// The offending line, trimmed and lossily converted to UTF-8.
    pub content: String,
    /// Parser error message.
    pub message: String,
}

/// Incremental NDJSON decoder.
///
/// # Example
///
/// ```
/// use serde_json::Value;
/// use socket_sdk_core::LineDecoder;
///
/// let mut decoder = LineDecoder::new();
/// decoder.push(b"{\"a\":1}\n{\"b\"");
/// decoder.push(b":2}\n");
/// decoder.finish();
///
/// let values: Vec<Value> = std::iter::from_fn(|| decoder.next_value::<Value>())
///     .map(Result::unwrap)
///     .collect();
/// assert_eq!(values.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Trailing fragment of a line whose `\n` has not arrived yet.
    buffer: BytesMut,
    /// Bytes of `buffer` already known not to contain `\n`.
    scanned: usize,
    /// Complete lines waiting to be decoded, with their line numbers.
    pending: VecDeque<(usize, Bytes)>,
    /// Number of lines split off so far.
    lines_seen: usize,
    finished: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of input and split off every line it completes.
    ///
    /// Input pushed after [`finish`](Self::finish) is ignored.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.finished || chunk.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let mut line = self.buffer.split_to(end + 1);
            line.truncate(end);
            self.scanned = 0;
            self.enqueue(line.freeze());
        }
        self.scanned = self.buffer.len();
    }

    /// Mark the end of input. A non-blank trailing fragment becomes the final line.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.scanned = 0;
        let rest = self.buffer.split().freeze();
        if !rest.trim_ascii().is_empty() {
            self.enqueue(rest);
        }
    }

    /// Decode the next complete, non-blank line.
    ///
    /// Returns `None` when no complete line is pending; more input (or
    /// [`finish`](Self::finish)) may produce further items.
    pub fn next_value<T: DeserializeOwned>(&mut self) -> Option<Result<T, LineError>> {
        let (line, raw) = self.pending.pop_front()?;
        let trimmed = raw.trim_ascii();
        Some(serde_json::from_slice(trimmed).map_err(|e| LineError {
            line,
            content: String::from_utf8_lossy(trimmed).into_owned(),
            message: e.to_string(),
        }))
    }

    /// Whether decoded items are ready without more input.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether [`finish`](Self::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether input is exhausted and every line has been handed out.
    pub fn is_done(&self) -> bool {
        self.finished && self.pending.is_empty()
    }

    /// Length in bytes of the incomplete trailing fragment.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn enqueue(&mut self, line: Bytes) {
        self.lines_seen += 1;
        if !line.trim_ascii().is_empty() {
            self.pending.push_back((self.lines_seen, line));
        }
    }
}

/// Decode a complete NDJSON document in one pass.
pub fn decode_all<T: DeserializeOwned>(input: &[u8]) -> Vec<Result<T, LineError>> {
    let mut decoder = LineDecoder::new();
    decoder.push(input);
    decoder.finish();
    Values::<T>::new(&mut decoder).collect()
}

/// Iterator draining the decoded values currently available in a [`LineDecoder`].
pub struct Values<'a, T> {
    decoder: &'a mut LineDecoder,
    _marker: PhantomData<T>,
}

impl<'a, T> Values<'a, T> {
    pub fn new(decoder: &'a mut LineDecoder) -> Self {
        Self {
            decoder,
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Iterator for Values<'_, T> {
    type Item = Result<T, LineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_value()
    }
}
