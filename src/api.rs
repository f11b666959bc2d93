//! Client for the detection proxy.
//!
//! The detector's API key never reaches this side of the wire: the core
//! talks to a thin proxy function that forwards the image to the hosted
//! model. The proxy expects a JSON body with the image base64-encoded and
//! takes the model version as a query parameter.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::http::{HttpError, HttpRequest, HttpResponse, ValidatedUrl};
use crate::detection::DetectionResponse;
use crate::image_processing::StagedImage;
use crate::{AppError, ErrorKind, ANALYZE_TIMEOUT_MS};

/// Production endpoint of the analyze proxy.
pub const DEFAULT_ANALYZE_ENDPOINT: &str =
    "https://palletscope.functions.supabase.co/analyze-image";

/// Published model versions of the hosted detector, with the precision each
/// one achieved on the project's validation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ModelVersion {
    #[serde(rename = "1")]
    V1,
    #[default]
    #[serde(rename = "2")]
    V2,
    #[serde(rename = "3")]
    V3,
}

impl ModelVersion {
    pub const ALL: [Self; 3] = [Self::V1, Self::V2, Self::V3];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "1",
            Self::V2 => "2",
            Self::V3 => "3",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "1" => Some(Self::V1),
            "2" => Some(Self::V2),
            "3" => Some(Self::V3),
            _ => None,
        }
    }

    /// Precision on the validation set, in percent.
    #[must_use]
    pub const fn precision_pct(self) -> f64 {
        match self {
            Self::V1 => 61.0,
            Self::V2 => 91.9,
            Self::V3 => 87.1,
        }
    }

    #[must_use]
    pub const fn is_recommended(self) -> bool {
        matches!(self, Self::V2)
    }

    #[must_use]
    pub fn display_name(self) -> String {
        if self.is_recommended() {
            format!("Version {} (Recommended)", self.as_str())
        } else {
            format!("Version {}", self.as_str())
        }
    }
}

impl std::fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where and how to reach the analyze proxy.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    analyze_url: ValidatedUrl,
    client_key: Option<SecretString>,
    timeout_ms: u64,
}

impl ApiConfig {
    pub fn new(analyze_url: impl Into<String>) -> Result<Self, HttpError> {
        Ok(Self {
            analyze_url: ValidatedUrl::new(analyze_url)?,
            client_key: None,
            timeout_ms: ANALYZE_TIMEOUT_MS,
        })
    }

    /// Publishable key the proxy uses to identify this app. Not the
    /// detector's API key, which only the proxy holds.
    #[must_use]
    pub fn with_client_key(mut self, key: impl Into<String>) -> Self {
        self.client_key = Some(SecretString::new(key.into()));
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn analyze_url(&self) -> &ValidatedUrl {
        &self.analyze_url
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYZE_ENDPOINT).expect("default analyze endpoint is a valid URL")
    }
}

/// JSON body the proxy expects. Field names are part of its contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(rename = "imageBase64")]
    pub image_base64: String,
    pub filename: String,
}

/// Error body the proxy returns on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProxyErrorBody {
    #[serde(default)]
    error: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("analysis request failed: {0}")]
    Http(#[from] HttpError),

    #[error("detection service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("malformed detection response: {reason}")]
    MalformedResponse { reason: String },
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        let kind = match &e {
            ApiError::Http(http) => match http {
                HttpError::Timeout { .. } => ErrorKind::Timeout,
                HttpError::ConnectionError { .. } => ErrorKind::Network,
                _ => ErrorKind::Analysis,
            },
            ApiError::Service { .. } => ErrorKind::Analysis,
            ApiError::MalformedResponse { .. } => ErrorKind::Deserialization,
        };
        AppError::new(kind, e.to_string())
    }
}

/// Builds the POST that ships one staged image to the proxy.
///
/// # Errors
///
/// Returns [`HttpError`] when the configured endpoint plus query parameter
/// stops validating or the encoded body exceeds the request size cap.
pub fn build_analyze_request(
    config: &ApiConfig,
    staged: &StagedImage,
    version: ModelVersion,
) -> Result<HttpRequest, HttpError> {
    let url = config
        .analyze_url
        .with_query("modelVersion", version.as_str())?;

    let body = AnalyzeRequest {
        image_base64: BASE64.encode(&staged.data),
        filename: staged.file_name.clone(),
    };

    let mut request = HttpRequest::post(url.as_str())?
        .with_json(&body)?
        .with_timeout_ms(config.timeout_ms)?;

    if let Some(key) = &config.client_key {
        request = request.with_header(
            "Authorization",
            format!("Bearer {}", key.expose_secret()),
        )?;
    }

    Ok(request)
}

/// Interprets the proxy's reply. A non-2xx status or an unparseable body is
/// an [`ApiError`]; the normalizer is never invoked for a failed cycle.
pub fn parse_analyze_response(response: &HttpResponse) -> Result<DetectionResponse, ApiError> {
    if !response.is_success() {
        let message = serde_json::from_slice::<ProxyErrorBody>(response.body())
            .ok()
            .filter(|body| !body.error.is_empty())
            .map_or_else(
                || format!("HTTP {}", response.status()),
                |body| body.error,
            );

        return Err(ApiError::Service {
            status: response.status(),
            message,
        });
    }

    serde_json::from_slice(response.body()).map_err(|e| ApiError::MalformedResponse {
        reason: e.to_string(),
    })
}
