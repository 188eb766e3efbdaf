// crates/renderflow/src/api/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::render::RenderOptions;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Stream,
    Url,
}

/// Raw `POST /render` body. Everything optional so validation can say what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderRequest {
    pub text: Option<String>,
    pub options: Option<RenderRequestOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequestOptions {
    pub output_format: Option<OutputFormat>,
    pub quality: Option<i64>,
    pub fps: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRenderRequest {
    pub text: String,
    pub output_format: OutputFormat,
    pub options: RenderOptions,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderUrlResponse {
    pub video_url: String,
    pub expires_at: DateTime<Utc>,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
}
