//! Encoders that turn application data into record payloads.
//!
//! The sink only sees the [`RecordEncoder`] capability: write one record into
//! a [`RecordWriter`] or fail. A failed encode is rolled back by the buffer.

use crate::buffer::{BufferError, RecordWriter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Buffer rejected record bytes: {0}")]
    Buffer(#[from] BufferError),
    #[error("I/O error while encoding: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Record rejected by encoder: {0}")]
    Rejected(String),
}

pub trait RecordEncoder {
    fn encode(&self, writer: &mut RecordWriter<'_>) -> Result<(), EncodeError>;

    /// Payload size when known up front, so oversized records can be
    /// refused before touching a buffer.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

impl<F> RecordEncoder for F
where
    F: Fn(&mut RecordWriter<'_>) -> Result<(), EncodeError>,
{
    fn encode(&self, writer: &mut RecordWriter<'_>) -> Result<(), EncodeError> {
        self(writer)
    }
}

/// Pre-encoded payload copied verbatim.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a>(pub &'a [u8]);

impl RecordEncoder for RawRecord<'_> {
    fn encode(&self, writer: &mut RecordWriter<'_>) -> Result<(), EncodeError> {
        writer.write_bytes(self.0)?;
        Ok(())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.0.len())
    }
}

/// JSON event used by the command line tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(flatten)]
    pub tags: Map<String, Value>,
}

impl EventRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            message: message.into(),
            tags: Map::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// A line holding a JSON object becomes tags, with its `message` field
    /// (if any) lifted out. Anything else is taken as the message itself.
    pub fn from_line(line: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(mut tags)) => {
                let message = match tags.remove("message") {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                let mut event = Self::new(message);
                event.tags = tags;
                event
            }
            _ => Self::new(line),
        }
    }
}

impl RecordEncoder for EventRecord {
    fn encode(&self, writer: &mut RecordWriter<'_>) -> Result<(), EncodeError> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }
}
