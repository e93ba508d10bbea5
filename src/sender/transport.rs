use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Success,
    /// Worth retrying later with the same data.
    Intermittent,
    /// The gate will never accept this request.
    Definitive,
}

/// What the transport observed, kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Http(u16),
    Timeout,
    Unreachable,
    NetworkError,
    Cancelled,
    RequestFailure,
}

impl ResponseCode {
    pub fn classify(self) -> SendStatus {
        match self {
            ResponseCode::Http(200..=299) => SendStatus::Success,
            ResponseCode::Http(408 | 429) | ResponseCode::Http(500..=599) => {
                SendStatus::Intermittent
            }
            ResponseCode::Http(_) | ResponseCode::RequestFailure => SendStatus::Definitive,
            ResponseCode::Timeout
            | ResponseCode::Unreachable
            | ResponseCode::NetworkError
            | ResponseCode::Cancelled => SendStatus::Intermittent,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCode::Http(status) => write!(f, "HTTP {status}"),
            ResponseCode::Timeout => f.write_str("timeout"),
            ResponseCode::Unreachable => f.write_str("unreachable"),
            ResponseCode::NetworkError => f.write_str("network error"),
            ResponseCode::Cancelled => f.write_str("cancelled"),
            ResponseCode::RequestFailure => f.write_str("request failure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub status: SendStatus,
    pub code: ResponseCode,
}

impl From<ResponseCode> for SendOutcome {
    fn from(code: ResponseCode) -> Self {
        Self {
            status: code.classify(),
            code,
        }
    }
}

/// Delivers one request body to a gate stream.
///
/// Implementations check `cancel` before dispatching; once a request is on
/// the wire it is awaited until it completes or times out.
pub trait GateTransport: Send + Sync + 'static {
    fn send(
        &self,
        stream: &str,
        api_key: &str,
        body: Bytes,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = SendOutcome> + Send;
}
