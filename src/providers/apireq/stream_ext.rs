use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;

use super::json_stream_parser::{JsonStreamParser, StreamFormat};

/// The body of a streamed response
pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

pub(crate) trait ReqwestResponseStreamExt {
    /// Newline-delimited JSON objects, one per line
    fn stream_ndjson(self) -> JsonStreamParser<ByteStream>;

    /// JSON objects carried in the `data` field of server-sent events
    fn stream_sse(self) -> JsonStreamParser<ByteStream>;
}

impl ReqwestResponseStreamExt for reqwest::Response {
    fn stream_ndjson(self) -> JsonStreamParser<ByteStream> {
        JsonStreamParser::new(Box::pin(self.bytes_stream()), StreamFormat::Ndjson)
    }

    fn stream_sse(self) -> JsonStreamParser<ByteStream> {
        JsonStreamParser::new(Box::pin(self.bytes_stream()), StreamFormat::Sse)
    }
}
