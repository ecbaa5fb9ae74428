//! Upload side of the Amazon DSP integration.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::creative::{CreativeFormat, ProcessedCreative, ViewabilityConfig};
use crate::validation::parse_dimensions;

/// Minimum markup length the DSP accepts.
pub const MIN_MARKUP_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DspCreativeType {
    #[serde(rename = "CUSTOM_HTML")]
    CustomHtml,
    #[serde(rename = "VAST_3_0")]
    Vast3,
}

impl DspCreativeType {
    pub fn for_format(format: CreativeFormat) -> Self {
        if format.is_video() {
            DspCreativeType::Vast3
        } else {
            DspCreativeType::CustomHtml
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DspCreativeType::CustomHtml => "CUSTOM_HTML",
            DspCreativeType::Vast3 => "VAST_3_0",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DspError {
    #[error("DSP rejected creative: {0}")]
    Rejected(String),
    #[error("DSP unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DspUploadRequest {
    pub name: String,
    pub dsp_creative_type: DspCreativeType,
    pub markup: String,
    pub width: u32,
    pub height: u32,
    pub advertiser_id: String,
    pub viewability_config: ViewabilityConfig,
}

impl DspUploadRequest {
    pub fn from_creative(
        creative: &ProcessedCreative,
        advertiser_id: impl Into<String>,
    ) -> Result<Self, DspError> {
        let (width, height) = parse_dimensions(&creative.dimensions)
            .map_err(|e| DspError::Rejected(e.to_string()))?;
        Ok(Self {
            name: creative.name.clone(),
            dsp_creative_type: creative.creative_type,
            markup: creative.processed_code.clone(),
            width,
            height,
            advertiser_id: advertiser_id.into(),
            viewability_config: creative.viewability_config.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DspUploadResponse {
    pub creative_id: String,
    pub name: String,
    pub status: ReviewStatus,
    pub approval_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait DspClient: Send + Sync {
    async fn upload_creative(&self, request: DspUploadRequest)
        -> Result<DspUploadResponse, DspError>;
}

/// Stand-in DSP that validates and reviews uploads in memory.
#[derive(Default)]
pub struct MockDspClient {
    uploads: Mutex<HashMap<String, DspUploadResponse>>,
}

impl MockDspClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_creative(&self, dsp_creative_id: &str) -> Option<DspUploadResponse> {
        self.uploads
            .lock()
            .ok()
            .and_then(|uploads| uploads.get(dsp_creative_id).cloned())
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().map(|u| u.len()).unwrap_or_default()
    }
}

#[async_trait]
impl DspClient for MockDspClient {
    async fn upload_creative(
        &self,
        request: DspUploadRequest,
    ) -> Result<DspUploadResponse, DspError> {
        log::info!("Uploading creative {} to DSP", request.name);

        if request.markup.len() < MIN_MARKUP_LEN {
            return Err(DspError::Rejected("Creative code too short".to_string()));
        }
        if request.width == 0 || request.height == 0 {
            return Err(DspError::Rejected("Invalid dimensions".to_string()));
        }

        let auto_approve = request.name.to_lowercase().contains("test")
            || request.dsp_creative_type == DspCreativeType::CustomHtml;
        let (status, approval_status, review_feedback) = if auto_approve {
            (ReviewStatus::Approved, "APPROVED", None)
        } else {
            (
                ReviewStatus::Pending,
                "UNDER_REVIEW",
                Some("Pending creative review".to_string()),
            )
        };

        let mut uploads = self
            .uploads
            .lock()
            .map_err(|_| DspError::Unavailable("upload registry lock poisoned".to_string()))?;
        let now = Utc::now();
        let creative_id = format!("creative_{}_{}", now.timestamp_millis(), uploads.len());
        let response = DspUploadResponse {
            creative_id: creative_id.clone(),
            name: request.name,
            status,
            approval_status: approval_status.to_string(),
            review_feedback,
            created_at: now,
        };
        uploads.insert(creative_id.clone(), response.clone());
        log::info!("Creative uploaded: {} ({})", creative_id, status.as_str());
        Ok(response)
    }
}
