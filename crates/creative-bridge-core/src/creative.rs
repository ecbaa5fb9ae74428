//! Creative configuration and processed-artifact types.
//!
//! `CreativeConfig` is what callers submit; `ProcessedCreative` is what the
//! processor persists. Viewability phase/vendor rules are enforced when a
//! `ViewabilityConfig` is built, including when it is deserialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dsp::DspCreativeType;
use crate::validation::parse_dimensions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativeFormat {
    /// HTML5 display banner (Kargo "runway").
    Runway,
    InstreamVideo,
    EnhancedPreroll,
}

impl CreativeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreativeFormat::Runway => "runway",
            CreativeFormat::InstreamVideo => "instream_video",
            CreativeFormat::EnhancedPreroll => "enhanced_preroll",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(
            self,
            CreativeFormat::InstreamVideo | CreativeFormat::EnhancedPreroll
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewabilityPhase {
    /// DoubleVerify only; IAS tags are stripped.
    #[serde(rename = "phase_1")]
    Phase1,
    /// IAS server-to-server plus DoubleVerify.
    #[serde(rename = "phase_2")]
    Phase2,
}

impl ViewabilityPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewabilityPhase::Phase1 => "phase_1",
            ViewabilityPhase::Phase2 => "phase_2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewabilityVendor {
    DoubleVerify,
    Ias,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    #[default]
    Mobile,
    Tablet,
    Ctv,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Ctv => "ctv",
        }
    }
}

/// Errors raised while building or validating a creative configuration.
/// All of them are fatal and are reported before any snippet is fetched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid dimensions '{0}': expected WIDTHxHEIGHT with positive integers")]
    InvalidDimensions(String),
    #[error("Invalid snippet URL: {0}")]
    InvalidSnippetUrl(String),
    #[error("Viewability configuration requires at least one vendor")]
    NoVendors,
    #[error("Phase 1 must not include IAS (removed to prevent conflicting measurement)")]
    IasInPhase1,
    #[error("Phase 2 requires both IAS and DoubleVerify vendors, got {0}")]
    InsufficientPhase2Vendors(usize),
    #[error("Invalid creative configuration: {0}")]
    Invalid(#[from] ValidationErrors),
}

fn default_true() -> bool {
    true
}

/// Raw, unchecked shape of a viewability configuration as it arrives on the
/// wire. Converted into [`ViewabilityConfig`] through `TryFrom`.
#[derive(Debug, Clone, Deserialize)]
struct ViewabilityConfigSpec {
    phase: ViewabilityPhase,
    vendors: Vec<ViewabilityVendor>,
    method: String,
    #[serde(default = "default_true")]
    dv_native: bool,
    #[serde(default = "default_true")]
    ias_removed: bool,
    #[serde(default)]
    ias_s2s_enabled: bool,
    #[serde(default)]
    dsp_seat_id: Option<String>,
    #[serde(default)]
    pub_id: Option<String>,
}

/// Viewability measurement configuration.
///
/// Phase 1 may not declare IAS; phase 2 must declare two distinct vendors.
/// Both rules hold for every value of this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ViewabilityConfigSpec")]
pub struct ViewabilityConfig {
    phase: ViewabilityPhase,
    vendors: Vec<ViewabilityVendor>,
    method: String,
    dv_native: bool,
    ias_removed: bool,
    ias_s2s_enabled: bool,
    dsp_seat_id: Option<String>,
    pub_id: Option<String>,
}

impl ViewabilityConfig {
    pub fn new(
        phase: ViewabilityPhase,
        vendors: Vec<ViewabilityVendor>,
        method: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut unique: Vec<ViewabilityVendor> = Vec::with_capacity(vendors.len());
        for vendor in vendors {
            if !unique.contains(&vendor) {
                unique.push(vendor);
            }
        }

        if unique.is_empty() {
            return Err(ConfigError::NoVendors);
        }
        match phase {
            ViewabilityPhase::Phase1 if unique.contains(&ViewabilityVendor::Ias) => {
                return Err(ConfigError::IasInPhase1);
            }
            ViewabilityPhase::Phase2 if unique.len() < 2 => {
                return Err(ConfigError::InsufficientPhase2Vendors(unique.len()));
            }
            _ => {}
        }

        Ok(Self {
            phase,
            vendors: unique,
            method: method.into(),
            dv_native: true,
            ias_removed: true,
            ias_s2s_enabled: false,
            dsp_seat_id: None,
            pub_id: None,
        })
    }

    /// Enable IAS server-to-server measurement for the given seat/publisher.
    pub fn with_s2s(mut self, dsp_seat_id: impl Into<String>, pub_id: impl Into<String>) -> Self {
        self.ias_s2s_enabled = true;
        self.dsp_seat_id = Some(dsp_seat_id.into());
        self.pub_id = Some(pub_id.into());
        self
    }

    pub fn phase(&self) -> ViewabilityPhase {
        self.phase
    }

    pub fn vendors(&self) -> &[ViewabilityVendor] {
        &self.vendors
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn dv_native(&self) -> bool {
        self.dv_native
    }

    pub fn ias_removed(&self) -> bool {
        self.ias_removed
    }

    pub fn ias_s2s_enabled(&self) -> bool {
        self.ias_s2s_enabled
    }

    pub fn dsp_seat_id(&self) -> Option<&str> {
        self.dsp_seat_id.as_deref()
    }

    pub fn pub_id(&self) -> Option<&str> {
        self.pub_id.as_deref()
    }
}

impl TryFrom<ViewabilityConfigSpec> for ViewabilityConfig {
    type Error = ConfigError;

    fn try_from(spec: ViewabilityConfigSpec) -> Result<Self, Self::Error> {
        let mut config = ViewabilityConfig::new(spec.phase, spec.vendors, spec.method)?;
        config.dv_native = spec.dv_native;
        config.ias_removed = spec.ias_removed;
        config.ias_s2s_enabled = spec.ias_s2s_enabled;
        config.dsp_seat_id = spec.dsp_seat_id;
        config.pub_id = spec.pub_id;
        Ok(config)
    }
}

fn default_vast_version() -> String {
    "3.0".to_string()
}

/// Configuration for processing one Kargo snippet into a DSP-ready creative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativeConfig {
    pub name: String,
    pub format: CreativeFormat,
    /// `WIDTHxHEIGHT`, e.g. `320x50`.
    pub dimensions: String,
    pub snippet_url: String,
    #[serde(default)]
    pub device_type: DeviceType,

    /// Video duration in seconds; required for video formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default = "default_vast_version")]
    pub vast_version: String,
    #[serde(default)]
    pub branded_canvas: bool,

    #[serde(default = "default_true")]
    pub cache_buster: bool,
    pub viewability_config: ViewabilityConfig,

    #[serde(default = "default_true")]
    pub amazon_macros: bool,
    #[serde(default = "default_true")]
    pub click_tracking: bool,
}

impl CreativeConfig {
    pub fn new(
        name: impl Into<String>,
        format: CreativeFormat,
        dimensions: impl Into<String>,
        snippet_url: impl Into<String>,
        viewability_config: ViewabilityConfig,
    ) -> Self {
        Self {
            name: name.into(),
            format,
            dimensions: dimensions.into(),
            snippet_url: snippet_url.into(),
            device_type: DeviceType::default(),
            duration: None,
            vast_version: default_vast_version(),
            branded_canvas: false,
            cache_buster: true,
            viewability_config,
            amazon_macros: true,
            click_tracking: true,
        }
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_branded_canvas(mut self, enabled: bool) -> Self {
        self.branded_canvas = enabled;
        self
    }

    pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn with_cache_buster(mut self, enabled: bool) -> Self {
        self.cache_buster = enabled;
        self
    }

    pub fn phase(&self) -> ViewabilityPhase {
        self.viewability_config.phase()
    }
}

impl Validate for CreativeConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.name.trim().is_empty() {
            let mut error = ValidationError::new("required");
            error.message = Some("name must be non-empty".into());
            errors.add("name", error);
        }

        if let Err(e) = parse_dimensions(&self.dimensions) {
            let mut error = ValidationError::new("dimensions");
            error.message = Some(e.to_string().into());
            errors.add("dimensions", error);
        }

        if self.format.is_video() {
            match self.duration {
                None => {
                    let mut error = ValidationError::new("required");
                    error.message =
                        Some(format!("duration is required for {}", self.format.as_str()).into());
                    errors.add("duration", error);
                }
                Some(0) => {
                    let mut error = ValidationError::new("range");
                    error.message = Some("duration must be at least one second".into());
                    errors.add("duration", error);
                }
                Some(_) => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Provenance of one processing run. Reflects the transformations that
/// actually ran, not the ones that were requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub processed_at: DateTime<Utc>,
    pub processing_time_ms: f64,
    pub original_snippet_size: usize,
    pub processed_snippet_size: usize,
    pub tags_removed: Vec<String>,
    pub tags_added: Vec<String>,
    pub warnings: Vec<String>,
    pub phase_applied: ViewabilityPhase,
}

/// External DSP identity assigned after upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub dsp_creative_id: String,
    pub status: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A creative transformed for the DSP and persisted by the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedCreative {
    pub creative_id: String,
    pub name: String,
    pub format: CreativeFormat,
    pub dimensions: String,
    pub original_snippet_url: String,
    pub processed_code: String,
    pub dsp_ready: bool,
    pub creative_type: DspCreativeType,
    pub viewability_config: ViewabilityConfig,
    pub processing_metadata: ProcessingMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadRecord>,
}
