pub mod config;
pub mod creative;
pub mod dsp;
pub mod patterns;
pub mod processor;
pub mod provider;
pub mod render;
pub mod store;
pub mod transform;
pub mod validation;

pub use creative::{
    ConfigError, CreativeConfig, CreativeFormat, DeviceType, ProcessedCreative,
    ProcessingMetadata, ViewabilityConfig, ViewabilityPhase, ViewabilityVendor,
};
pub use processor::{
    BatchFailure, BatchReport, BatchSuccess, CreativeProcessor, ProcessingError, ProcessingStage,
};
pub use validation::CreativeValidator;
