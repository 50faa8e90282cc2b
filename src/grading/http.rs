/// HTTP grading client
///
/// Talks JSON to a grading service:
/// - `POST {endpoint}/v1/grade` with one image, answers `{"evaluation": {...}}`
/// - `POST {endpoint}/v1/grade/group` with a burst, answers
///   `{"results": {"<file name>": {...}}}`

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::Grader;
use crate::config::GradingConfig;
use crate::error::{CuratorError, Result};
use crate::media::PreparedImage;
use crate::state::evaluation::Evaluation;

const USER_AGENT: &str = concat!("photo-curator/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagePayload<'a> {
    name: &'a str,
    mime_type: &'a str,
    /// Base64 image bytes
    data: String,
}

#[derive(Debug, Serialize)]
struct GradeRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    images: Vec<ImagePayload<'a>>,
}

#[derive(Debug, Deserialize)]
struct GradeOneResponse {
    evaluation: Evaluation,
}

#[derive(Debug, Deserialize)]
struct GradeGroupResponse {
    #[serde(default)]
    results: HashMap<String, Evaluation>,
}

/// Grading service client
pub struct HttpGrader {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl HttpGrader {
    pub fn new(config: &GradingConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn request_body<'a>(&'a self, images: &'a [(String, PreparedImage)]) -> GradeRequest<'a> {
        GradeRequest {
            model: self.model.as_deref(),
            images: images
                .iter()
                .map(|(name, image)| ImagePayload {
                    name,
                    mime_type: image.mime_type,
                    data: STANDARD.encode(&image.data),
                })
                .collect(),
        }
    }

    async fn post(&self, path: &str, body: &GradeRequest<'_>) -> Result<String> {
        let url = format!("{}{}", self.endpoint, path);
        tracing::debug!(url = %url, images = body.images.len(), "Calling grading service");

        let mut request = self.http_client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        check_status(status, &text)?;
        Ok(text)
    }
}

#[async_trait]
impl Grader for HttpGrader {
    async fn grade_one(&self, name: &str, image: &PreparedImage) -> Result<Evaluation> {
        let images = [(name.to_string(), image.clone())];
        let text = self.post("/v1/grade", &self.request_body(&images)).await?;
        parse_one(&text)
    }

    async fn grade_group(
        &self,
        images: &[(String, PreparedImage)],
    ) -> Result<HashMap<String, Evaluation>> {
        let text = self.post("/v1/grade/group", &self.request_body(images)).await?;
        parse_group(&text)
    }
}

fn check_status(status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
    if status == StatusCode::TOO_MANY_REQUESTS {
        Err(CuratorError::Quota(detail))
    } else {
        Err(CuratorError::Grading(detail))
    }
}

fn parse_one(text: &str) -> Result<Evaluation> {
    serde_json::from_str::<GradeOneResponse>(text)
        .map(|r| r.evaluation)
        .map_err(|e| CuratorError::Grading(format!("Malformed response: {}", e)))
}

fn parse_group(text: &str) -> Result<HashMap<String, Evaluation>> {
    serde_json::from_str::<GradeGroupResponse>(text)
        .map(|r| r.results)
        .map_err(|e| CuratorError::Grading(format!("Malformed response: {}", e)))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
