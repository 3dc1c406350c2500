//! Conversions from request and stream errors into provider errors

use super::error::ErrorKind as ReqwestErrorKind;
use super::{JsonStreamError, ReqwestError};
use crate::providers::{Error, ErrorKind};

impl From<JsonStreamError> for Error {
    fn from(value: JsonStreamError) -> Self {
        let kind = match &value {
            JsonStreamError::DeserializationFailed { .. }
            | JsonStreamError::UnsupportedSseField(_)
            | JsonStreamError::ResponseExceededBuffer => ErrorKind::UnexpectedResponse,
            JsonStreamError::StreamFailed(_) => ErrorKind::UnspecifiedError,
        };

        Error::from_source(kind, Box::new(value))
    }
}

impl From<ReqwestError> for Error {
    fn from(value: ReqwestError) -> Self {
        let kind = match value.kind() {
            ReqwestErrorKind::ConnectFailed => ErrorKind::Connection,
            ReqwestErrorKind::DecodingFailed | ReqwestErrorKind::RedirectPolicyViolated => {
                ErrorKind::UnexpectedResponse
            }
            ReqwestErrorKind::TimedOut => ErrorKind::TimedOut,
            ReqwestErrorKind::UnknownReqwestError => ErrorKind::UnspecifiedError,
        };

        Error::from_source(kind, Box::new(value))
    }
}
