pub mod content;
pub mod http;
pub mod stats;
pub mod stream_sender;
pub mod transport;

pub use content::{RECORDS_COUNT_SIZE, build_request_body};
pub use http::{HttpGateTransport, HttpTransportConfig, TransportError};
pub use stats::{SinkCounters, StatisticsCollector};
pub use stream_sender::{StreamSendResult, StreamSender};
pub use transport::{GateTransport, ResponseCode, SendOutcome, SendStatus};
