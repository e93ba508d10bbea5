use crate::app::config::serde_helpers as duration_millis;
use crate::buffer::PoolLimits;
use crate::sender::RECORDS_COUNT_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
    #[error("Inconsistent sink settings: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub gate_url: String,
    pub api_key: String,
    pub initial_buffer_size: usize,
    pub max_buffer_size: usize,
    pub max_record_size: usize,
    pub max_request_size: usize,
    pub max_memory: usize,
    #[serde(with = "duration_millis")]
    pub send_period: Duration,
    #[serde(with = "duration_millis")]
    pub send_period_cap: Duration,
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    /// Memory usage at which writers wake the senders early.
    pub flush_memory_threshold_percent: u8,
    /// Memory usage at which senders drain without waiting after a success.
    pub pressure_threshold_percent: u8,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            gate_url: "http://localhost:6306".to_string(),
            api_key: String::new(),
            initial_buffer_size: 4 * KIB,
            max_buffer_size: 16 * MIB,
            max_record_size: MIB,
            max_request_size: 4 * MIB,
            max_memory: 128 * MIB,
            send_period: Duration::from_secs(2),
            send_period_cap: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(30),
            flush_memory_threshold_percent: 25,
            pressure_threshold_percent: 50,
        }
    }
}

impl SinkSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let sizes = [
            ("initial_buffer_size", self.initial_buffer_size),
            ("max_buffer_size", self.max_buffer_size),
            ("max_record_size", self.max_record_size),
            ("max_request_size", self.max_request_size),
            ("max_memory", self.max_memory),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(SettingsError::Zero(name));
            }
        }
        if self.send_period.is_zero() {
            return Err(SettingsError::Zero("send_period"));
        }
        if self.request_timeout.is_zero() {
            return Err(SettingsError::Zero("request_timeout"));
        }

        if self.initial_buffer_size > self.max_buffer_size {
            return Err(SettingsError::Inconsistent(format!(
                "initial_buffer_size ({}) exceeds max_buffer_size ({})",
                self.initial_buffer_size, self.max_buffer_size
            )));
        }
        if self.max_record_size > self.max_buffer_size {
            return Err(SettingsError::Inconsistent(format!(
                "max_record_size ({}) exceeds max_buffer_size ({})",
                self.max_record_size, self.max_buffer_size
            )));
        }
        if self.max_record_size > self.max_slice_size() {
            return Err(SettingsError::Inconsistent(format!(
                "max_record_size ({}) does not fit into a request of max_request_size ({})",
                self.max_record_size, self.max_request_size
            )));
        }
        if self.max_memory < self.initial_buffer_size {
            return Err(SettingsError::Inconsistent(format!(
                "max_memory ({}) cannot hold a single buffer of initial_buffer_size ({})",
                self.max_memory, self.initial_buffer_size
            )));
        }
        if self.send_period > self.send_period_cap {
            return Err(SettingsError::Inconsistent(format!(
                "send_period ({:?}) exceeds send_period_cap ({:?})",
                self.send_period, self.send_period_cap
            )));
        }
        for (name, value) in [
            ("flush_memory_threshold_percent", self.flush_memory_threshold_percent),
            ("pressure_threshold_percent", self.pressure_threshold_percent),
        ] {
            if value > 100 {
                return Err(SettingsError::Inconsistent(format!(
                    "{name} ({value}) is not a percentage"
                )));
            }
        }

        Ok(())
    }

    pub fn pool_limits(&self) -> PoolLimits {
        PoolLimits {
            initial_buffer_size: self.initial_buffer_size,
            max_buffer_size: self.max_buffer_size,
            max_record_size: self.max_record_size,
        }
    }

    /// Request size left for record bytes once the record count is written.
    pub fn max_slice_size(&self) -> usize {
        self.max_request_size.saturating_sub(RECORDS_COUNT_SIZE)
    }
}

/// Per-stream overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub api_key: Option<String>,
}
