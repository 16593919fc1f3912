pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod model;
pub mod normalization;
pub mod orchestrator;
pub mod pricing;
pub mod sources;

pub mod util {
    pub mod env;
}

pub use config::{PipelineConfig, YearWindow};
pub use error::{CollectError, FetchError, PipelineError};
pub use model::{ApiCategory, Dataset, RawRecord, VehicleRecord, VehicleType};
pub use orchestrator::{run_pipeline, FallbackReason, Pipeline, RunSummary};
