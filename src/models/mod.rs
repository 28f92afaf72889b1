//! Records that flow between the pipeline stages.

pub mod features;
pub mod frame;
pub mod patient;
pub mod prediction;

pub use features::{FeatureMeta, SplitRows};
pub use patient::{Encounter, LabResult, LabTest, Patient, Sex};
pub use prediction::{PredictRequest, PredictResponse};
