//! JSON helpers on top of the orchestrator.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::{NetworkError, NetworkOrchestrator, RequestSpec};

/// Errors from the JSON API helpers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request itself failed after retries.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// No bearer token was found in the stored auth blob.
    #[error("no access token available in '{0}'")]
    MissingToken(String),

    /// The request or response body was not valid JSON for the expected type.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

const TOKEN_POINTERS: [&str; 3] = [
    "/access_token",
    "/currentSession/access_token",
    "/session/access_token",
];

impl NetworkOrchestrator {
    /// Issues a JSON request and decodes a JSON response.
    ///
    /// Sets the JSON content type when the request has none. Non-2xx
    /// responses become [`ApiError::Status`].
    pub async fn api_call<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T, ApiError> {
        let spec = if spec.header_value("Content-Type").is_none() {
            spec.header("Content-Type", "application/json")
        } else {
            spec
        };

        let response = self.handle_request(spec, None).await?;
        if !response.is_success() {
            return Err(ApiError::Status {
                status: response.status,
                body: response.text(),
            });
        }

        Ok(response.json()?)
    }

    /// Posts `body` to the named backend function with the stored bearer token.
    pub async fn invoke_function<B, T>(&self, name: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.access_token()?;
        let url = format!(
            "{}/{}",
            self.inner.config.functions_base_url.trim_end_matches('/'),
            name.trim_start_matches('/')
        );

        let spec = RequestSpec::post(url)
            .json(body)?
            .header("Authorization", format!("Bearer {}", token));
        self.api_call(spec).await
    }

    /// Bearer token from the auth blob in local storage.
    pub fn access_token(&self) -> Result<String, ApiError> {
        let key = &self.inner.config.auth_storage_key;
        let raw = match self.inner.local.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Err(ApiError::MissingToken(key.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read auth token");
                return Err(ApiError::MissingToken(key.clone()));
            }
        };

        let blob: serde_json::Value = serde_json::from_str(&raw)?;
        TOKEN_POINTERS
            .iter()
            .find_map(|pointer| blob.pointer(pointer).and_then(|v| v.as_str()))
            .map(str::to_string)
            .ok_or_else(|| ApiError::MissingToken(key.clone()))
    }
}
