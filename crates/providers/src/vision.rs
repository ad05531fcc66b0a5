use crate::auth::{ServiceAccountKey, TokenSource};
use crate::{Annotator, Label, ProviderError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-vision";

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    pub scope: String,
    /// Upper bound on labels per image; `None` leaves it to the service.
    pub max_results: Option<u32>,
    pub timeout: Duration,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            max_results: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Label detection through the Cloud Vision `images:annotate` endpoint.
#[derive(Clone)]
pub struct GoogleVisionClient {
    client: Client,
    cfg: Arc<VisionConfig>,
    tokens: Arc<TokenSource>,
}

impl GoogleVisionClient {
    pub fn new(key: ServiceAccountKey, cfg: VisionConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let tokens = TokenSource::new(client.clone(), key, cfg.scope.clone());
        Ok(Self {
            client,
            cfg: Arc::new(cfg),
            tokens: Arc::new(tokens),
        })
    }

    pub fn from_credential_file(path: &Path, cfg: VisionConfig) -> Result<Self, ProviderError> {
        Self::new(ServiceAccountKey::from_file(path)?, cfg)
    }
}

#[derive(Serialize)]
struct BatchRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Serialize)]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u32>,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    label_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
    #[serde(default)]
    score: f32,
}

#[derive(Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

fn label_request(image: &[u8], max_results: Option<u32>) -> BatchRequest {
    BatchRequest {
        requests: vec![ImageRequest {
            image: ImageContent {
                content: STANDARD.encode(image),
            },
            features: vec![Feature {
                kind: "LABEL_DETECTION",
                max_results,
            }],
        }],
    }
}

fn labels_from_response(parsed: BatchResponse) -> Result<Vec<Label>, ProviderError> {
    let Some(first) = parsed.responses.into_iter().next() else {
        return Ok(Vec::new());
    };
    if let Some(status) = first.error {
        return Err(ProviderError::Api(format!(
            "code {}: {}",
            status.code, status.message
        )));
    }
    Ok(first
        .label_annotations
        .into_iter()
        .map(|a| Label::new(a.description, a.score))
        .collect())
}

#[async_trait::async_trait]
impl Annotator for GoogleVisionClient {
    async fn annotate(&self, image: &[u8]) -> Result<Vec<Label>, ProviderError> {
        let token = self.tokens.token().await?;
        let body = label_request(image, self.cfg.max_results);

        let resp = self
            .client
            .post(&self.cfg.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::RequestFailed(format!(
                "status {} body {:?}",
                status, body
            )));
        }

        let parsed: BatchResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        labels_from_response(parsed)
    }
}
