use super::transport::{GateTransport, ResponseCode, SendOutcome};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

const SEND_PATH: &str = "stream/sendAsync";
const API_KEY_HEADER: &str = "apiKey";

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid gate URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub gate_url: String,
    pub connection_timeout: Duration,
    pub max_idle_connections: usize,
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
}

impl HttpTransportConfig {
    pub fn new(gate_url: impl Into<String>) -> Self {
        Self {
            gate_url: gate_url.into(),
            connection_timeout: Duration::from_secs(10),
            max_idle_connections: 20,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: format!("gate-sink/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Gate transport over HTTP: `POST {gate}/stream/sendAsync?stream=<name>`.
#[derive(Debug, Clone)]
pub struct HttpGateTransport {
    client: Client,
    send_url: Url,
}

impl HttpGateTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let mut base: Url = config
            .gate_url
            .parse()
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", config.gate_url)))?;

        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let send_url = base
            .join(SEND_PATH)
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        let client = ClientBuilder::new()
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(config.keep_alive_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client, send_url })
    }

    pub fn send_url(&self) -> &Url {
        &self.send_url
    }

    fn request_code(error: &reqwest::Error) -> ResponseCode {
        if error.is_timeout() {
            ResponseCode::Timeout
        } else if error.is_connect() {
            ResponseCode::Unreachable
        } else if error.is_builder() {
            ResponseCode::RequestFailure
        } else {
            ResponseCode::NetworkError
        }
    }
}

impl GateTransport for HttpGateTransport {
    async fn send(
        &self,
        stream: &str,
        api_key: &str,
        body: Bytes,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        if cancel.is_cancelled() {
            return ResponseCode::Cancelled.into();
        }

        let mut url = self.send_url.clone();
        url.query_pairs_mut().append_pair("stream", stream);

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(timeout)
            .body(body)
            .send()
            .await;

        let code = match response {
            Ok(response) => ResponseCode::Http(response.status().as_u16()),
            Err(e) => {
                debug!(stream, error = %e, "Gate request failed");
                Self::request_code(&e)
            }
        };

        code.into()
    }
}
