use super::TaggingOracle;
use crate::model::ImageAnalysis;
use crate::{GalleriaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;

const ANALYZE_PATH: &str = "vision/v3.2/analyze";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Client for the Azure Computer Vision `analyze` endpoint.
pub struct VisionTaggingOracle {
    client: reqwest::Client,
    analyze_url: String,
    subscription_key: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    tags: Vec<AnalyzeTag>,
    #[serde(default)]
    description: Option<AnalyzeDescription>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeDescription {
    #[serde(default)]
    captions: Vec<AnalyzeCaption>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeCaption {
    text: String,
}

impl From<AnalyzeResponse> for ImageAnalysis {
    fn from(response: AnalyzeResponse) -> Self {
        let description = response
            .description
            .and_then(|d| d.captions.into_iter().next())
            .map(|caption| caption.text)
            .unwrap_or_default();

        Self {
            tags: response.tags.into_iter().map(|tag| tag.name).collect(),
            description,
        }
    }
}

impl VisionTaggingOracle {
    pub fn new(
        endpoint: &str,
        subscription_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(GalleriaError::Config(
                "tagging endpoint cannot be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GalleriaError::Config(format!("tagging client: {}", e)))?;

        Ok(Self {
            client,
            analyze_url: format!(
                "{}/{}?visualFeatures=Tags,Description",
                endpoint, ANALYZE_PATH
            ),
            subscription_key: subscription_key.into(),
        })
    }

    pub fn analyze_url(&self) -> &str {
        &self.analyze_url
    }
}

#[async_trait]
impl TaggingOracle for VisionTaggingOracle {
    async fn analyze(&self, bytes: Bytes) -> Result<ImageAnalysis> {
        let response = self
            .client
            .post(&self.analyze_url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GalleriaError::Unavailable(format!(
                "vision analyze returned {}: {}",
                status, body
            )));
        }

        let parsed: AnalyzeResponse = response.json().await?;
        Ok(parsed.into())
    }
}
