//! Helpers shared by the HTTP backends for making requests and parsing
//! streamed responses.

mod conversions;
mod error;
mod json_stream_parser;
mod stream_ext;

pub(crate) use error::Error as ReqwestError;
pub(crate) use reqwest::Url;

pub(crate) use json_stream_parser::Error as JsonStreamError;
pub(crate) use json_stream_parser::JsonStreamParser;
pub(crate) use stream_ext::{ByteStream, ReqwestResponseStreamExt};
