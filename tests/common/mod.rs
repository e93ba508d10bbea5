#![allow(dead_code)]

use bytes::Bytes;
use gate_sink::sender::{GateTransport, ResponseCode, SendOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub stream: String,
    pub api_key: String,
    pub body: Bytes,
}

impl CapturedRequest {
    pub fn records(&self) -> Vec<Vec<u8>> {
        decode_body(&self.body)
    }
}

#[derive(Default)]
struct Inner {
    script: Mutex<VecDeque<ResponseCode>>,
    requests: Mutex<Vec<CapturedRequest>>,
}

/// In-memory gate: answers with scripted codes (then 200) and keeps every
/// request it saw.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, codes: impl IntoIterator<Item = ResponseCode>) {
        self.inner.script.lock().extend(codes);
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.inner.requests.lock().clone()
    }

    pub fn sent_records(&self) -> Vec<Vec<u8>> {
        self.requests().iter().flat_map(CapturedRequest::records).collect()
    }
}

impl GateTransport for ScriptedTransport {
    async fn send(
        &self,
        stream: &str,
        api_key: &str,
        body: Bytes,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        if cancel.is_cancelled() {
            return ResponseCode::Cancelled.into();
        }

        self.inner.requests.lock().push(CapturedRequest {
            stream: stream.to_string(),
            api_key: api_key.to_string(),
            body,
        });

        self.inner
            .script
            .lock()
            .pop_front()
            .unwrap_or(ResponseCode::Http(200))
            .into()
    }
}

/// Splits a request body into record payloads, checking the framing.
pub fn decode_body(body: &[u8]) -> Vec<Vec<u8>> {
    let count = i32::from_be_bytes(body[..4].try_into().unwrap()) as usize;
    let records = decode_records(&body[4..]);
    assert_eq!(records.len(), count, "record count prefix mismatch");
    records
}

/// Splits length-prefixed records laid out back to back.
pub fn decode_records(data: &[u8]) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let length = i32::from_be_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        records.push(data[offset..offset + length].to_vec());
        offset += length;
    }
    assert_eq!(offset, data.len(), "truncated record");
    records
}
