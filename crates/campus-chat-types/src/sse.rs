//! Incremental decoder for `text/event-stream` bodies.
//!
//! Both the provider's streaming completions and the relay's own stream use
//! server-sent events whose `data:` field carries one JSON document. Network
//! reads split events at arbitrary byte offsets, so the decoder buffers raw
//! bytes and only yields an event once its terminating blank line arrived.
//! [`sse_items`] wraps the decoder around a byte stream.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};

/// Buffers raw bytes and yields the `data` payload of every complete event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return the data of every event they complete, in
    /// order. Events without a `data:` field (comments, keep-alives) are
    /// skipped.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some((end, sep_len)) = find_boundary(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + sep_len).collect();
            if let Some(data) = parse_frame(&frame[..end]) {
                events.push(data);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let frame = std::mem::take(&mut self.buffer);
        parse_frame(&frame)
    }
}

/// What to do with one decoded `data` payload.
#[derive(Debug, PartialEq)]
pub enum SseStep<T, E> {
    /// Yield the item and keep reading.
    Item(T),
    /// Yield the item and end the stream.
    Last(T),
    /// Yield the error and end the stream.
    Fail(E),
    /// Nothing to yield for this payload.
    Skip,
    /// End the stream without yielding.
    End,
}

/// Decode a `text/event-stream` body into items.
///
/// `accept` maps each event's data to an [`SseStep`]. A transport error is
/// yielded once and ends the stream, as does the end of the body, after any
/// unterminated trailing event has been handed to `accept`.
pub fn sse_items<S, B, E, T, Er, F>(bytes: S, accept: F) -> impl Stream<Item = Result<T, Er>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    Er: From<E>,
    F: FnMut(&str) -> SseStep<T, Er>,
{
    let state = Items {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        accept,
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    for data in st.decoder.feed(chunk.as_ref()) {
                        st.take(&data);
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.push_back(Err(Er::from(e)));
                }
                None => {
                    if let Some(data) = st.decoder.finish() {
                        st.take(&data);
                    }
                    st.finished = true;
                }
            }
        }
    })
}

struct Items<S, F, T, Er> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    accept: F,
    pending: VecDeque<Result<T, Er>>,
    finished: bool,
}

impl<S, F, T, Er> Items<S, F, T, Er>
where
    F: FnMut(&str) -> SseStep<T, Er>,
{
    fn take(&mut self, data: &str) {
        if self.finished {
            return;
        }
        match (self.accept)(data) {
            SseStep::Item(item) => self.pending.push_back(Ok(item)),
            SseStep::Last(item) => {
                self.finished = true;
                self.pending.push_back(Ok(item));
            }
            SseStep::Fail(e) => {
                self.finished = true;
                self.pending.push_back(Err(e));
            }
            SseStep::Skip => {}
            SseStep::End => self.finished = true,
        }
    }
}

/// Position and length of the earliest event separator in `buf`.
fn find_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buf, b"\n\n").map(|i| (i, 2));
    let crlf = find(buf, b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_frame(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let data: Vec<&str> = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}
