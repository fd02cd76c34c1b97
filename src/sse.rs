//! Server-Sent Events (SSE) stream decoding.
//!
//! SSE format:
//! ```text
//! data: {"key": "value"}
//!
//! data: {"another": "event"}
//!
//! data: [DONE]
//! ```
//!
//! [`FrameDecoder`] turns raw bytes into frame payloads and tracks where it is
//! in the stream. [`EventStream`] drives a decoder from a transport body and
//! yields one decoded event per data frame, in arrival order. The stream ends
//! at the `[DONE]` sentinel or when the transport closes; a frame that is not
//! JSON at all ends it with an error.

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::BytesMut;
use futures::stream::{self, Stream};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::client::ClientError;
use crate::http::ByteStream;
use crate::model::{decode_value, frame_error};

/// Prefix of a data line.
pub const DATA_PREFIX: &str = "data:";

/// Payload that marks the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Where a [`FrameDecoder`] is in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Nothing buffered, waiting for bytes.
    Idle,
    /// Holding a partial line.
    ReadingLine,
    /// A complete data line was recognized.
    HaveFrame,
    /// A payload was handed out for decoding.
    Emitting,
    /// The transport closed; buffered lines are still being processed.
    Draining,
    /// Finished cleanly. Terminal.
    Done,
    /// Stopped on a malformed frame or transport failure. Terminal.
    Errored,
}

/// Result of asking the decoder for the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Payload of one data frame, without the prefix.
    Frame(String),
    /// No complete line is buffered; feed more bytes.
    NeedMore,
    /// The stream is over.
    End,
}

/// Line-oriented frame decoder.
///
/// Partial lines are kept across [`feed`](Self::feed) calls, so chunk
/// boundaries may fall anywhere, including inside a multi-byte character.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no line terminator.
    scanned: usize,
    state: DecoderState,
    closed: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            state: DecoderState::Idle,
            closed: false,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Number of bytes held for lines not yet processed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, DecoderState::Done | DecoderState::Errored)
    }

    /// Append bytes received from the transport.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.is_terminated() || self.closed || chunk.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(chunk);
        self.state = DecoderState::ReadingLine;
    }

    /// The transport reached end of stream. A close without the sentinel is
    /// a normal short close, not an error.
    pub fn close(&mut self) {
        if !self.is_terminated() {
            self.closed = true;
            self.state = DecoderState::Draining;
        }
    }

    /// Stop without emitting anything further and release buffered bytes.
    pub fn cancel(&mut self) {
        self.buffer = BytesMut::new();
        self.scanned = 0;
        self.state = DecoderState::Done;
    }

    /// Stop after a hard failure and release buffered bytes.
    pub fn fail(&mut self) {
        self.buffer = BytesMut::new();
        self.scanned = 0;
        self.state = DecoderState::Errored;
    }

    /// Extract the next data frame from buffered bytes.
    ///
    /// Blank lines separate frames and are skipped, as are comments and
    /// non-data fields such as `event:` or `id:`.
    pub fn next_frame(&mut self) -> Result<Step, ClientError> {
        loop {
            if self.is_terminated() {
                return Ok(Step::End);
            }

            let newline = self.buffer[self.scanned..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|pos| self.scanned + pos);

            let line = match newline {
                Some(pos) => {
                    self.scanned = 0;
                    self.buffer.split_to(pos + 1)
                }
                // Last line of a body that did not end with a newline.
                None if self.closed && !self.buffer.is_empty() => {
                    self.scanned = 0;
                    self.buffer.split()
                }
                None if self.closed => {
                    self.state = DecoderState::Done;
                    return Ok(Step::End);
                }
                None => {
                    self.scanned = self.buffer.len();
                    self.state = if self.buffer.is_empty() {
                        DecoderState::Idle
                    } else {
                        DecoderState::ReadingLine
                    };
                    return Ok(Step::NeedMore);
                }
            };

            let line = match std::str::from_utf8(&line) {
                Ok(line) => line.trim_end_matches(&['\r', '\n'][..]),
                Err(e) => {
                    self.fail();
                    return Err(ClientError::Decode(format!("stream line is not UTF-8: {e}")));
                }
            };

            let Some(payload) = parse_sse_line(line) else {
                if !line.is_empty() {
                    trace!(line, "skipping non-data SSE line");
                }
                continue;
            };
            self.state = DecoderState::HaveFrame;

            if payload.is_empty() {
                continue;
            }
            if is_done_marker(payload) {
                self.cancel();
                return Ok(Step::End);
            }

            self.state = DecoderState::Emitting;
            return Ok(Step::Frame(payload.to_string()));
        }
    }
}

/// Parse an SSE line to extract the data portion.
///
/// # Example
/// ```
/// use openai_service::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"key\": \"value\"}"), Some("{\"key\": \"value\"}"));
/// assert_eq!(parse_sse_line("data:[DONE]"), Some("[DONE]"));
/// assert_eq!(parse_sse_line(": keep-alive"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX).map(|s| s.trim())
}

/// Check if an SSE data payload indicates the stream is done.
pub fn is_done_marker(data: &str) -> bool {
    data == DONE_SENTINEL
}

/// Decode one frame payload. A top-level `error` object becomes a
/// [`ClientError::Stream`].
pub fn decode_frame<T: DeserializeOwned>(payload: &str) -> Result<T, ClientError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ClientError::Decode(format!("malformed stream frame: {e}")))?;
    if let Some(message) = frame_error(&value) {
        return Err(ClientError::Stream(message));
    }
    decode_value(value)
}

/// Lazy, single-pass sequence of events decoded from an SSE body.
///
/// Dropping the stream drops the transport body, which cancels the
/// underlying request. Events already yielded stay valid after an error.
pub struct EventStream<T> {
    body: ByteStream,
    decoder: FrameDecoder,
    _event: PhantomData<fn() -> T>,
}

impl<T> EventStream<T> {
    pub fn new(body: ByteStream) -> Self {
        Self {
            body,
            decoder: FrameDecoder::new(),
            _event: PhantomData,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// Abandon the stream: the transport body is dropped, buffered bytes are
    /// released, and no further event is produced.
    pub fn cancel(&mut self) {
        self.decoder.cancel();
        self.body = Box::pin(stream::empty());
    }
}

impl<T: DeserializeOwned> Stream for EventStream<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match this.decoder.next_frame() {
                Ok(Step::Frame(payload)) => {
                    let event = decode_frame::<T>(&payload);
                    if event.is_err() {
                        this.decoder.fail();
                    }
                    return Poll::Ready(Some(event));
                }
                Ok(Step::End) => return Poll::Ready(None),
                Ok(Step::NeedMore) => {}
                Err(e) => return Poll::Ready(Some(Err(e))),
            }

            match ready!(this.body.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.decoder.feed(&chunk),
                Some(Err(e)) => {
                    this.decoder.fail();
                    return Poll::Ready(Some(Err(e)));
                }
                None => this.decoder.close(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;
    use serde::Deserialize;

    use crate::model::ChatCompletionChunkObject;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Event {
        n: u32,
    }

    fn body(chunks: &[&'static str]) -> ByteStream {
        let chunks: Vec<Result<Bytes, ClientError>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: hello"), Some("hello"));
        assert_eq!(
            parse_sse_line("data: {\"key\": \"value\"}"),
            Some("{\"key\": \"value\"}")
        );
        assert_eq!(parse_sse_line("data:   spaces  "), Some("spaces"));
        assert_eq!(parse_sse_line("event: message"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn test_is_done_marker() {
        assert!(is_done_marker("[DONE]"));
        assert!(!is_done_marker(""));
        assert!(!is_done_marker("{\"key\": \"value\"}"));
    }

    #[test]
    fn test_decoder_states() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.state(), DecoderState::Idle);
        assert_eq!(decoder.next_frame().unwrap(), Step::NeedMore);
        assert_eq!(decoder.state(), DecoderState::Idle);

        decoder.feed(b"data: {\"n\"");
        assert_eq!(decoder.next_frame().unwrap(), Step::NeedMore);
        assert_eq!(decoder.state(), DecoderState::ReadingLine);

        decoder.feed(b":1}\n\n");
        assert_eq!(decoder.next_frame().unwrap(), Step::Frame("{\"n\":1}".to_string()));
        assert_eq!(decoder.state(), DecoderState::Emitting);
        assert_eq!(decoder.next_frame().unwrap(), Step::NeedMore);

        decoder.feed(b"data: [DONE]\n\n");
        assert_eq!(decoder.next_frame().unwrap(), Step::End);
        assert_eq!(decoder.state(), DecoderState::Done);
        assert_eq!(decoder.buffered(), 0);

        decoder.feed(b"data: {\"n\":2}\n");
        assert_eq!(decoder.next_frame().unwrap(), Step::End);
    }

    #[test]
    fn test_decoder_scans_each_byte_once() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"data: {\"n\":");
        assert_eq!(decoder.next_frame().unwrap(), Step::NeedMore);
        assert_eq!(decoder.scanned, 11);

        for _ in 0..1000 {
            decoder.feed(b" ");
            assert_eq!(decoder.next_frame().unwrap(), Step::NeedMore);
            assert_eq!(decoder.scanned, decoder.buffered());
        }

        decoder.feed(b"1}\ndata: {\"n\":2}\n");
        assert_eq!(decoder.next_frame().unwrap(), Step::Frame(format!("{{\"n\":{}1}}", " ".repeat(1000))));
        assert_eq!(decoder.scanned, 0);
        assert_eq!(decoder.next_frame().unwrap(), Step::Frame("{\"n\":2}".to_string()));
    }

    #[test]
    fn test_decoder_close_drains_unterminated_line() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"data: {\"n\":1}\n\ndata: {\"n\":2}");
        decoder.close();
        assert_eq!(decoder.state(), DecoderState::Draining);

        assert_eq!(decoder.next_frame().unwrap(), Step::Frame("{\"n\":1}".to_string()));
        assert_eq!(decoder.next_frame().unwrap(), Step::Frame("{\"n\":2}".to_string()));
        assert_eq!(decoder.next_frame().unwrap(), Step::End);
        assert_eq!(decoder.state(), DecoderState::Done);
    }

    #[test]
    fn test_decoder_skips_crlf_comments_and_fields() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b": keep-alive\r\nevent: message\r\nid: 7\r\ndata: {\"n\":3}\r\n\r\n");
        assert_eq!(decoder.next_frame().unwrap(), Step::Frame("{\"n\":3}".to_string()));
    }

    #[test]
    fn test_decoder_rejects_invalid_utf8() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"data: \xff\xfe\n");
        assert!(matches!(decoder.next_frame(), Err(ClientError::Decode(_))));
        assert_eq!(decoder.state(), DecoderState::Errored);
        assert_eq!(decoder.next_frame().unwrap(), Step::End);
    }

    #[tokio::test]
    async fn test_stream_stops_at_sentinel() {
        let stream = EventStream::<ChatCompletionChunkObject>::new(body(&[
            "data: {\"choices\":[{\"index\":0}]}\n\n",
            "data: {\"choices\":[{\"index\":1}]}\n\n",
            "data: [DONE]\n\n",
        ]));

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
        let indexes: Vec<_> = events
            .into_iter()
            .map(|event| event.unwrap().choices[0].index)
            .collect();
        assert_eq!(indexes, vec![Some(0), Some(1)]);
    }

    #[tokio::test]
    async fn test_stream_ignores_frames_after_sentinel() {
        let mut stream = EventStream::<Event>::new(body(&[
            "data: {\"n\":1}\n\ndata: [DONE]\n\ndata: {\"n\":2}\n\n",
        ]));

        assert_eq!(stream.next().await.unwrap().unwrap(), Event { n: 1 });
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), DecoderState::Done);
    }

    #[tokio::test]
    async fn test_stream_close_without_sentinel_is_clean() {
        let mut stream = EventStream::<Event>::new(body(&["data: {\"n\":1}\n\n"]));

        assert_eq!(stream.next().await.unwrap().unwrap(), Event { n: 1 });
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), DecoderState::Done);
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_frames() {
        let stream = EventStream::<Event>::new(body(&[
            "da",
            "ta: {\"n\":",
            "1}\n",
            "\ndata: {\"n\":2}\n\nda",
            "ta: [DO",
            "NE]\n\n",
        ]));

        let events: Vec<Event> = stream.map(|event| event.unwrap()).collect().await;
        assert_eq!(events, vec![Event { n: 1 }, Event { n: 2 }]);
    }

    #[tokio::test]
    async fn test_stream_splits_multibyte_character() {
        let bytes = "data: {\"content\":\"héllo\"}\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..split])),
            Ok(Bytes::copy_from_slice(&bytes[split..])),
        ];

        #[derive(Deserialize)]
        struct Content {
            content: String,
        }

        let mut stream = EventStream::<Content>::new(Box::pin(stream::iter(chunks)));
        assert_eq!(stream.next().await.unwrap().unwrap().content, "héllo");
    }

    #[tokio::test]
    async fn test_malformed_frame_halts_stream() {
        let mut stream = EventStream::<Event>::new(body(&[
            "data: {\"n\":1}\n\n",
            "data: {not json\n\n",
            "data: {\"n\":3}\n\n",
        ]));

        assert_eq!(stream.next().await.unwrap().unwrap(), Event { n: 1 });
        assert!(matches!(
            stream.next().await,
            Some(Err(ClientError::Decode(_)))
        ));
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), DecoderState::Errored);
    }

    #[tokio::test]
    async fn test_partial_fields_are_not_malformed() {
        let mut stream = EventStream::<ChatCompletionChunkObject>::new(body(&[
            "data: {\"choices\":[{\"delta\":{\"content\":7}}]}\n\n",
        ]));

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.delta_content(), None);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_frame_halts_stream() {
        let mut stream = EventStream::<Event>::new(body(&[
            "data: {\"error\":{\"message\":\"server overloaded\",\"type\":\"server_error\"}}\n\n",
            "data: {\"n\":1}\n\n",
        ]));

        match stream.next().await {
            Some(Err(ClientError::Stream(message))) => assert_eq!(message, "server overloaded"),
            other => panic!("expected stream error, got {:?}", other),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_propagates_and_halts() {
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n\n")),
            Err(ClientError::Transport("connection reset".to_string())),
            Ok(Bytes::from_static(b"data: {\"n\":2}\n\n")),
        ];
        let mut stream = EventStream::<Event>::new(Box::pin(stream::iter(chunks)));

        assert_eq!(stream.next().await.unwrap().unwrap(), Event { n: 1 });
        assert!(matches!(
            stream.next().await,
            Some(Err(ClientError::Transport(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_mid_line_emits_nothing_more() {
        let mut stream = EventStream::<Event>::new(body(&["data: {\"n\":1}\n\ndata: {\"n\"", ":2}\n\n"]));

        assert_eq!(stream.next().await.unwrap().unwrap(), Event { n: 1 });
        stream.cancel();
        assert_eq!(stream.state(), DecoderState::Done);
        assert_eq!(stream.decoder.buffered(), 0);
        assert!(stream.next().await.is_none());
    }
}
