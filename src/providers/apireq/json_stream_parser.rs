//! Incremental parsing of JSON objects streamed in an HTTP response body.
//!
//! Two framings are supported: newline-delimited JSON (Ollama) and the `data`
//! field of server-sent events (OpenAI). The parser consumes the byte stream
//! produced by [`reqwest::Response::bytes_stream`] and yields one object at a
//! time, regardless of how the body was split into chunks on the wire.

use bytes::Bytes;
use futures_core::stream::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::marker::Unpin;

use super::ReqwestError;

const DEFAULT_MAX_SIZE: usize = 1 << 22; // 4 MiB
const DEFAULT_CAPACITY: usize = 1 << 10; // 1 KiB

#[derive(Debug, Clone, Copy)]
pub(crate) enum StreamFormat {
    /// Newline-delimited JSON
    /// See https://github.com/ndjson/ndjson-spec
    Ndjson,
    /// Server-sent events, restricted to `data` fields and comments
    Sse,
}

// Only the subset of server-sent events used to stream completions is understood:
// `data` fields, comments and blank-line event terminators. Any other field is an error.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("unsupported server-sent event field \"{0}\", only \"data\" is understood")]
    UnsupportedSseField(String),

    #[error("the response overflowed the streaming buffer")]
    ResponseExceededBuffer,

    #[error("failed to deserialize a streamed JSON object \"{blob}\"")]
    DeserializationFailed {
        blob: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("the source stream failed")]
    StreamFailed(#[source] ReqwestError),
}

#[derive(Debug)]
pub(crate) struct JsonStreamParser<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    stream: S,
    format: StreamFormat,
    max_size: usize,
    /// Bytes received but not yet consumed
    buf: Vec<u8>,
    /// Prefix of `buf` already known to contain no newline
    scanned: usize,
    /// The JSON text of the object being assembled
    payload: Vec<u8>,
    exhausted: bool,
}

impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin> JsonStreamParser<S> {
    pub(crate) fn new(stream: S, format: StreamFormat) -> JsonStreamParser<S> {
        Self::with_max_size(stream, format, DEFAULT_MAX_SIZE)
    }

    pub(crate) fn with_max_size(
        stream: S,
        format: StreamFormat,
        max_size: usize,
    ) -> JsonStreamParser<S> {
        JsonStreamParser {
            stream,
            format,
            max_size,
            buf: Vec::with_capacity(DEFAULT_CAPACITY),
            scanned: 0,
            payload: Vec::new(),
            exhausted: false,
        }
    }

    /// Pulls the next chunk off the stream. Returns false once the stream ends.
    async fn refill(&mut self) -> Result<bool, Error> {
        match self.stream.next().await {
            Some(Ok(bytes)) => {
                self.buf.extend_from_slice(&bytes);

                // Complete lines are drained by `assemble`; only the unterminated
                // tail is bounded.
                let tail = match self.buf.iter().rposition(|&b| b == b'\n') {
                    Some(i) => self.buf.len() - i - 1,
                    None => self.buf.len(),
                };

                if tail > self.max_size {
                    return Err(Error::ResponseExceededBuffer);
                }

                Ok(true)
            }
            Some(Err(err)) => Err(Error::StreamFailed(err.into())),
            None => Ok(false),
        }
    }

    /// Removes the next complete line from the buffer, without its `[\r]\n`.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        match self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;

                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }

                self.scanned = 0;

                Some(line)
            }
            None => {
                self.scanned = self.buf.len();

                None
            }
        }
    }

    /// Consumes buffered lines until an object is complete. Returns false if
    /// more input is needed.
    fn assemble(&mut self) -> Result<bool, Error> {
        while let Some(line) = self.take_line() {
            match self.format {
                StreamFormat::Ndjson => {
                    if !line.is_empty() {
                        self.payload = line;
                        return Ok(true);
                    }
                }
                StreamFormat::Sse => {
                    if line.is_empty() {
                        // A blank line ends the event; events without data are comments.
                        if self.payload.is_empty() {
                            continue;
                        }

                        self.payload.pop();
                        return Ok(true);
                    }

                    let (field, value) = match line.iter().position(|&b| b == b':') {
                        Some(i) => (&line[..i], &line[i + 1..]),
                        None => (&line[..], &line[line.len()..]),
                    };

                    if field.is_empty() {
                        continue;
                    }

                    if field != b"data" {
                        return Err(Error::UnsupportedSseField(
                            String::from_utf8_lossy(field).into_owned(),
                        ));
                    }

                    let value = value.strip_prefix(b" ").unwrap_or(value);

                    if value == b"[DONE]" {
                        continue;
                    }

                    if self.payload.len() + value.len() + 1 > self.max_size {
                        return Err(Error::ResponseExceededBuffer);
                    }

                    // Multiple data lines of one event are joined with newlines.
                    self.payload.extend_from_slice(value);
                    self.payload.push(b'\n');
                }
            }
        }

        Ok(false)
    }

    /// Flushes whatever is left once the stream has ended.
    fn assemble_remainder(&mut self) -> bool {
        match self.format {
            StreamFormat::Ndjson => {
                let rest: Vec<u8> = self.buf.drain(..).collect();

                if rest.iter().all(|b| b.is_ascii_whitespace()) {
                    return false;
                }

                self.payload = rest;
                true
            }
            StreamFormat::Sse => {
                self.buf.clear();

                if self.payload.is_empty() {
                    return false;
                }

                self.payload.pop();
                true
            }
        }
    }

    async fn next_chunk(&mut self) -> Option<Result<&[u8], Error>> {
        self.payload.clear();

        if self.exhausted {
            return None;
        }

        loop {
            match self.assemble() {
                Ok(true) => return Some(Ok(&self.payload)),
                Ok(false) => {}
                Err(err) => return Some(Err(err)),
            }

            match self.refill().await {
                Ok(true) => continue,
                Ok(false) => {
                    self.exhausted = true;

                    return if self.assemble_remainder() {
                        Some(Ok(&self.payload))
                    } else {
                        None
                    };
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }

    /// Parses the next object in the stream, or returns `None` at the end.
    pub(crate) async fn parse<T: DeserializeOwned>(&mut self) -> Option<Result<T, Error>> {
        let chunk = self.next_chunk().await?;

        Some(chunk.and_then(|bytes| {
            serde_json::from_slice::<T>(bytes).map_err(|source| Error::DeserializationFailed {
                blob: String::from_utf8_lossy(bytes).into_owned(),
                source,
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde::Deserialize;

    const NDJSON_BODY: &str =
        "{\"model\":\"llama3\",\"done\":false}\n\n{\"model\":\"llama3\",\"done\":true}\n";

    const NDJSON_UNTERMINATED: &str =
        "{\"model\":\"a\",\"done\":false}\n{\"model\":\"b\",\"done\":true}";

    const SSE_BODY: &str = concat!(
        ": keep-alive\r\n\r\n",
        "data: {\"model\":\"gpt-4o\",\"done\":false}\r\n\r\n",
        "data:{\"model\":\"gpt-4o\",\"done\":true}\n\n",
        "data: [DONE]\n\n",
    );

    const SSE_MULTILINE: &str = "data: {\"model\":\"gpt-4o\",\ndata: \"done\":false}\n\n";

    const SSE_BAD_FIELD: &str = "event: ping\ndata: {}\n\n";

    type TestStream = stream::Iter<std::vec::IntoIter<Result<Bytes, reqwest::Error>>>;

    fn chunked(
        body: &'static str,
        chunk_size: usize,
        format: StreamFormat,
    ) -> JsonStreamParser<TestStream> {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = body
            .as_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        JsonStreamParser::new(stream::iter(chunks), format)
    }

    fn bounded(
        chunks: Vec<Vec<u8>>,
        format: StreamFormat,
        max_size: usize,
    ) -> JsonStreamParser<TestStream> {
        let chunks: Vec<Result<Bytes, reqwest::Error>> =
            chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();

        JsonStreamParser::with_max_size(stream::iter(chunks), format, max_size)
    }

    #[derive(Debug, Deserialize)]
    struct Chunk {
        model: String,
        done: bool,
    }

    #[tokio::test]
    async fn test_ndjson_any_chunking() {
        for chunk_size in 1..=NDJSON_BODY.len() {
            let mut parser = chunked(NDJSON_BODY, chunk_size, StreamFormat::Ndjson);

            let first: Chunk = parser.parse().await.unwrap().unwrap();
            assert_eq!(first.model, "llama3");
            assert!(!first.done);

            let second: Chunk = parser.parse().await.unwrap().unwrap();
            assert!(second.done);

            assert!(parser.parse::<Chunk>().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_ndjson_without_trailing_newline() {
        let mut parser = chunked(NDJSON_UNTERMINATED, 7, StreamFormat::Ndjson);

        assert_eq!(parser.parse::<Chunk>().await.unwrap().unwrap().model, "a");
        assert_eq!(parser.parse::<Chunk>().await.unwrap().unwrap().model, "b");
        assert!(parser.parse::<Chunk>().await.is_none());
    }

    #[tokio::test]
    async fn test_sse_any_chunking() {
        for chunk_size in 1..=16 {
            let mut parser = chunked(SSE_BODY, chunk_size, StreamFormat::Sse);

            let first: Chunk = parser.parse().await.unwrap().unwrap();
            assert_eq!(first.model, "gpt-4o");
            assert!(!first.done);

            let second: Chunk = parser.parse().await.unwrap().unwrap();
            assert!(second.done);

            // [DONE] carries no object
            assert!(parser.parse::<Chunk>().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_sse_joins_data_lines() {
        let mut parser = chunked(SSE_MULTILINE, 5, StreamFormat::Sse);

        let chunk: Chunk = parser.parse().await.unwrap().unwrap();
        assert_eq!(chunk.model, "gpt-4o");
        assert!(parser.parse::<Chunk>().await.is_none());
    }

    #[tokio::test]
    async fn test_sse_rejects_unknown_field() {
        let mut parser = chunked(SSE_BAD_FIELD, 64, StreamFormat::Sse);

        let err = parser.parse::<Chunk>().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::UnsupportedSseField(ref f) if f == "event"));
    }

    #[tokio::test]
    async fn test_malformed_object_reports_blob() {
        let mut parser = chunked("{\"model\": 3}\n", 4, StreamFormat::Ndjson);

        match parser.parse::<Chunk>().await.unwrap() {
            Err(Error::DeserializationFailed { blob, .. }) => assert_eq!(blob, "{\"model\": 3}"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let chunks = vec![
            b"{\"model\":\"a very long model name\"".to_vec(),
            b"}\n".to_vec(),
        ];

        let mut parser = bounded(chunks, StreamFormat::Ndjson, 16);

        let err = parser.parse::<Chunk>().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ResponseExceededBuffer));
    }

    #[tokio::test]
    async fn test_buffer_limit_applies_per_object() {
        // Ten 9-byte objects in one chunk, each well under the limit
        let body = "{\"a\":12}\n".repeat(10).into_bytes();

        let mut parser = bounded(vec![body], StreamFormat::Ndjson, 64);

        for _ in 0..10 {
            let value: serde_json::Value = parser.parse().await.unwrap().unwrap();
            assert_eq!(value["a"], 12);
        }

        assert!(parser.parse::<serde_json::Value>().await.is_none());
    }

    #[tokio::test]
    async fn test_buffer_limit_for_unterminated_sse_event() {
        // Data lines keep arriving but the event never ends
        let chunks = vec![b"data: xxx\n".to_vec(); 1000];

        let mut parser = bounded(chunks, StreamFormat::Sse, 64);

        let err = parser.parse::<Chunk>().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ResponseExceededBuffer));
    }
}
