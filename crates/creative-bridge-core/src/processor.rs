//! Orchestration: validate, fetch, transform, audit, persist.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::creative::{
    ConfigError, CreativeConfig, ProcessedCreative, ProcessingMetadata, UploadRecord,
    ViewabilityPhase,
};
use crate::dsp::{DspClient, DspCreativeType, DspError, DspUploadRequest};
use crate::provider::{FetchError, SnippetProvider};
use crate::store::{CreativeStore, StoreError};
use crate::transform::{
    inject_amazon_macros, inject_cache_buster, remove_ias_tags, Wrapper, FEATURE_AMAZON_MACROS,
    FEATURE_CACHE_BUSTER,
};
use crate::validation::CreativeValidator;

const SUPPORTED_VAST_VERSION: &str = "3.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Validation,
    Fetch,
    Persistence,
    Upload,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Validation => "validation",
            ProcessingStage::Fetch => "fetch",
            ProcessingStage::Persistence => "persistence",
            ProcessingStage::Upload => "upload",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Validation(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Upload(#[from] DspError),
    #[error("Processed creative not found: {0}")]
    CreativeNotFound(String),
}

impl ProcessingError {
    /// Pipeline stage that failed, so input problems can be told apart from
    /// upstream outages.
    pub fn stage(&self) -> ProcessingStage {
        match self {
            ProcessingError::Validation(_) => ProcessingStage::Validation,
            ProcessingError::Fetch(_) => ProcessingStage::Fetch,
            ProcessingError::Store(_) => ProcessingStage::Persistence,
            ProcessingError::Upload(_) | ProcessingError::CreativeNotFound(_) => {
                ProcessingStage::Upload
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub name: String,
    pub stage: ProcessingStage,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSuccess {
    pub index: usize,
    pub creative: ProcessedCreative,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: Vec<BatchSuccess>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn record_failure(
        &mut self,
        index: usize,
        name: impl Into<String>,
        stage: ProcessingStage,
        error: impl ToString,
    ) {
        self.failed.push(BatchFailure {
            index,
            name: name.into(),
            stage,
            error: error.to_string(),
        });
    }
}

pub struct CreativeProcessor {
    validator: CreativeValidator,
    provider: Arc<dyn SnippetProvider>,
    store: Arc<dyn CreativeStore>,
    dsp: Arc<dyn DspClient>,
}

impl CreativeProcessor {
    pub fn new(
        provider: Arc<dyn SnippetProvider>,
        store: Arc<dyn CreativeStore>,
        dsp: Arc<dyn DspClient>,
    ) -> Self {
        Self {
            validator: CreativeValidator::default(),
            provider,
            store,
            dsp,
        }
    }

    pub fn with_validator(mut self, validator: CreativeValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn validator(&self) -> &CreativeValidator {
        &self.validator
    }

    /// Fatal checks run before anything is fetched. Returns the non-fatal
    /// findings to carry into the metadata.
    fn validate_config(&self, config: &CreativeConfig) -> Result<Vec<String>, ConfigError> {
        config.validate()?;
        if !self.validator.validate_snippet_url(&config.snippet_url) {
            return Err(ConfigError::InvalidSnippetUrl(config.snippet_url.clone()));
        }

        let mut warnings = Vec::new();
        if !self
            .validator
            .validate_format_dimensions(config.format, &config.dimensions)
        {
            warnings.push(format!(
                "Unusual dimensions {} for format {}",
                config.dimensions,
                config.format.as_str()
            ));
        }
        if config.format.is_video() && config.vast_version != SUPPORTED_VAST_VERSION {
            warnings.push(format!(
                "VAST version {} requested; wrapper emits VAST {}",
                config.vast_version, SUPPORTED_VAST_VERSION
            ));
        }
        if !config.amazon_macros {
            warnings
                .push("amazon_macros disabled in config; macros were injected anyway".to_string());
        }
        Ok(warnings)
    }

    pub async fn process_creative(
        &self,
        config: &CreativeConfig,
    ) -> Result<ProcessedCreative, ProcessingError> {
        let started = Instant::now();
        log::info!("Processing creative: {}", config.name);

        let mut warnings = self.validate_config(config)?;
        for warning in &warnings {
            log::warn!("{}: {}", config.name, warning);
        }

        let snippet = self.provider.fetch_snippet(&config.snippet_url).await?;
        let original_size = snippet.snippet_code.len();
        let phase = config.phase();

        let mut tags_removed = Vec::new();
        let mut tags_added = Vec::new();

        let mut markup = match phase {
            ViewabilityPhase::Phase1 => {
                let (cleaned, removed) = remove_ias_tags(&snippet.snippet_code);
                if !removed.is_empty() {
                    log::info!("Removed {} IAS tags for phase 1", removed.len());
                }
                tags_removed = removed;
                cleaned
            }
            ViewabilityPhase::Phase2 => snippet.snippet_code,
        };

        markup = inject_amazon_macros(&markup);
        tags_added.push(FEATURE_AMAZON_MACROS.to_string());

        if config.cache_buster {
            markup = inject_cache_buster(&markup, None);
            tags_added.push(FEATURE_CACHE_BUSTER.to_string());
        }

        let wrapper = Wrapper::select(config.format, phase);
        log::debug!("Wrapping {} with {:?}", config.name, wrapper);
        let processed_code = wrapper.apply(&markup, config);
        tags_added.push(wrapper.feature_label().to_string());
        let dsp_ready = !processed_code.is_empty();
        if !dsp_ready {
            log::error!("{}: wrapper produced no markup", config.name);
            warnings.push("Wrapper produced no markup".to_string());
        }

        if config.format.is_video() {
            let vast_errors = self.validator.validate_vast_structure(&processed_code);
            for error in &vast_errors {
                log::warn!("{}: {}", config.name, error);
            }
            warnings.extend(vast_errors);
        }

        let phase_warnings = self.validator.validate_phase_configuration(
            phase,
            config.viewability_config.vendors(),
            &processed_code,
        );
        for warning in &phase_warnings {
            log::warn!("{}: {}", config.name, warning);
        }
        warnings.extend(phase_warnings);

        if processed_code.len() < original_size {
            let warning = format!(
                "Processed markup smaller than source after IAS removal ({} -> {} bytes)",
                original_size,
                processed_code.len()
            );
            log::warn!("{}: {}", config.name, warning);
            warnings.push(warning);
        }

        let now = Utc::now();
        let metadata = ProcessingMetadata {
            processed_at: now,
            processing_time_ms: (started.elapsed().as_secs_f64() * 1000.0).max(0.001),
            original_snippet_size: original_size,
            processed_snippet_size: processed_code.len(),
            tags_removed,
            tags_added,
            warnings,
            phase_applied: phase,
        };

        let creative = ProcessedCreative {
            creative_id: Uuid::now_v7().simple().to_string(),
            name: config.name.clone(),
            format: config.format,
            dimensions: config.dimensions.clone(),
            original_snippet_url: config.snippet_url.clone(),
            processed_code,
            dsp_ready,
            creative_type: DspCreativeType::for_format(config.format),
            viewability_config: config.viewability_config.clone(),
            processing_metadata: metadata,
            created_at: now,
            updated_at: now,
            upload: None,
        };
        self.store.save(&creative).await?;

        log::info!(
            "Creative processed: {} ({:.1}ms, {} -> {} bytes)",
            creative.creative_id,
            creative.processing_metadata.processing_time_ms,
            creative.processing_metadata.original_snippet_size,
            creative.processing_metadata.processed_snippet_size
        );
        Ok(creative)
    }

    /// Process every config independently. One failure never aborts the rest.
    pub async fn process_batch(&self, configs: &[CreativeConfig]) -> BatchReport {
        let results = join_all(configs.iter().map(|c| self.process_creative(c))).await;

        let mut report = BatchReport {
            total: configs.len(),
            ..Default::default()
        };
        for (index, (config, result)) in configs.iter().zip(results).enumerate() {
            match result {
                Ok(creative) => report.succeeded.push(BatchSuccess { index, creative }),
                Err(e) => {
                    log::error!(
                        "Creative {} failed at {}: {}",
                        config.name,
                        e.stage().as_str(),
                        e
                    );
                    report.record_failure(index, config.name.clone(), e.stage(), &e);
                }
            }
        }
        log::info!(
            "Batch finished: {}/{} succeeded",
            report.succeeded.len(),
            report.total
        );
        report
    }

    pub async fn get_processed_creative(
        &self,
        creative_id: &str,
    ) -> Result<Option<ProcessedCreative>, ProcessingError> {
        Ok(self.store.find(creative_id).await?)
    }

    pub async fn list_processed_creatives(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ProcessedCreative>, ProcessingError> {
        Ok(self.store.list(offset, limit).await?)
    }

    /// `Ok(false)` when nothing was stored under `creative_id`.
    pub async fn delete_processed_creative(
        &self,
        creative_id: &str,
    ) -> Result<bool, ProcessingError> {
        let deleted = self.store.delete(creative_id).await?;
        if deleted {
            log::info!("Deleted processed creative {}", creative_id);
        }
        Ok(deleted)
    }

    /// Send a stored creative to the DSP and record the external id and
    /// review status on it.
    pub async fn upload_to_dsp(
        &self,
        creative_id: &str,
        advertiser_id: &str,
    ) -> Result<ProcessedCreative, ProcessingError> {
        let creative = self
            .store
            .find(creative_id)
            .await?
            .ok_or_else(|| ProcessingError::CreativeNotFound(creative_id.to_string()))?;

        let request = DspUploadRequest::from_creative(&creative, advertiser_id)?;
        let response = self.dsp.upload_creative(request).await?;

        let record = UploadRecord {
            dsp_creative_id: response.creative_id,
            status: response.status.as_str().to_string(),
            uploaded_at: Utc::now(),
        };
        let updated = self.store.record_upload(creative_id, record).await?;
        log::info!(
            "Creative {} uploaded to DSP as {}",
            creative_id,
            updated
                .upload
                .as_ref()
                .map(|u| u.dsp_creative_id.as_str())
                .unwrap_or_default()
        );
        Ok(updated)
    }
}
