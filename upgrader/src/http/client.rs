//! HTTP client implementation

use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::errors::UpgradeError;

/// Failure of a single API request
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("cannot build request URL from {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// The service understood the request and refused it
    pub fn is_rejection(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => {
                status.is_client_error()
                    && *status != StatusCode::REQUEST_TIMEOUT
                    && *status != StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Transport(_) | ApiError::InvalidUrl(_) => false,
        }
    }

    /// Message suitable for an operation-specific error
    pub fn message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Transport(e) => e.to_string(),
            ApiError::InvalidUrl(base) => format!("cannot build request URL from {}", base),
        }
    }
}

impl From<ApiError> for UpgradeError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(e) => UpgradeError::HttpError(e),
            ApiError::InvalidUrl(base) => {
                UpgradeError::ConfigError(format!("cannot build request URL from {}", base))
            }
            status => UpgradeError::ConnectivityError(status.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the device-control service
pub struct HttpClient {
    client: Client,
    base: Url,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str) -> Result<Self, UpgradeError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| UpgradeError::ConfigError(format!("invalid controller URL {}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(UpgradeError::ConfigError(format!(
                "controller URL must be http or https: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base: parsed,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Append path segments to the base URL, percent-encoding each one
    pub fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let url = self.url(segments)?;
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        Self::decode("GET", request.send().await?).await
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        segments: &[&str],
        token: Option<&str>,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(segments)?;
        debug!("POST {}", url);

        let mut request = self.client.post(url).json(body);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        Self::decode("POST", request.send().await?).await
    }

    async fn decode<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} failed: {} - {}", method, status, body);
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(ApiError::Status { status, message });
        }

        Ok(response.json().await?)
    }
}
