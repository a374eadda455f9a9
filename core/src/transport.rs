/// Outbound transport for lifecycle payloads
///
/// The only protocol surface: POST a JSON body, look at the status code and,
/// for the follow-location variant, an optional `location` in the response.
use crate::error::DispatchError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Status reported for a response whose status cannot be inspected
pub const OPAQUE_STATUS: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    #[default]
    Cors,
    /// Response status and body are opaque to the caller
    NoCors,
}

impl RequestMode {
    pub fn from_no_cors(no_cors: bool) -> Self {
        if no_cors {
            RequestMode::NoCors
        } else {
            RequestMode::Cors
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
    pub status: u16,
    /// `location` field of a JSON response body, when present
    pub location: Option<String>,
}

impl TransportResponse {
    pub fn opaque() -> Self {
        Self {
            status: OPAQUE_STATUS,
            location: None,
        }
    }
}

/// Sends serialized payloads. Network-level failures come back as
/// [`DispatchError::Transport`]; status classification is left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        url: &Url,
        body: Vec<u8>,
        mode: RequestMode,
    ) -> Result<TransportResponse, DispatchError>;
}

#[derive(Debug, Deserialize)]
struct LocationBody {
    location: Option<String>,
}

/// reqwest-backed transport
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client, e.g. one with a request timeout.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        url: &Url,
        body: Vec<u8>,
        mode: RequestMode,
    ) -> Result<TransportResponse, DispatchError> {
        let response = self
            .http_client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if mode == RequestMode::NoCors {
            return Ok(TransportResponse::opaque());
        }

        let status = response.status().as_u16();
        // The body is optional; anything that is not `{ "location": "..." }` is ignored.
        let location = match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice::<LocationBody>(&bytes)
                .ok()
                .and_then(|b| b.location)
                .filter(|l| !l.is_empty()),
            Ok(_) => None,
            Err(e) => {
                debug!(target: "transport", error = %e, "Failed to read response body");
                None
            }
        };

        Ok(TransportResponse { status, location })
    }
}

pub fn is_valid_url(s: &str) -> bool {
    Url::parse(s).is_ok()
}

/// Accept the opaque sentinel and 200..=204; everything else is an error.
pub fn classify_status(status: u16) -> Result<(), DispatchError> {
    match status {
        OPAQUE_STATUS | 200..=204 => Ok(()),
        _ => Err(DispatchError::ResponseStatus { status }),
    }
}
