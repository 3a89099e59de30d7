//! HTTP transports.
//!
//! The orchestrator talks to the network only through [`HttpTransport`], so
//! tests can substitute scripted transports. [`ReqwestTransport`] is the real
//! implementation and [`HttpConnectivityProbe`] reuses the same client for
//! reachability checks.

use async_trait::async_trait;
use reqwest::Client;

use super::{HttpResponse, RequestSpec, TransportError};
use crate::platform::{ConnectivityProbe, PlatformError, PlatformResult, ProbeMode};

/// Issues one HTTP request. Timeouts are applied by the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &RequestSpec) -> Result<HttpResponse, TransportError>;
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    let message = err.to_string();
    if err.is_timeout() {
        TransportError {
            message,
            timed_out: true,
            connect: false,
        }
    } else if err.is_connect() {
        TransportError::connect(message)
    } else {
        TransportError::new(message)
    }
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder().build().map_err(|e| {
            TransportError::new(format!("Failed to create HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RequestSpec) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// [`ConnectivityProbe`] that issues real requests.
///
/// Same-origin probes send `HEAD` and require a 2xx status. No-cors probes
/// send `GET` and accept any response, mirroring an opaque browser fetch.
#[derive(Debug, Clone)]
pub struct HttpConnectivityProbe {
    client: Client,
}

impl HttpConnectivityProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn probe(&self, url: &str, mode: ProbeMode) -> PlatformResult<()> {
        let request = match mode {
            ProbeMode::SameOrigin => self.client.head(url).header("Cache-Control", "no-cache"),
            ProbeMode::NoCors => self.client.get(url),
        };

        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::failed("connectivity probe", e.to_string()))?;

        match mode {
            ProbeMode::SameOrigin if !response.status().is_success() => Err(PlatformError::failed(
                "connectivity probe",
                format!("{} returned {}", url, response.status()),
            )),
            _ => Ok(()),
        }
    }
}
