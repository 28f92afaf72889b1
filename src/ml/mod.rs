//! Model fitting, evaluation and the serialized prediction pipeline.

pub mod classifier;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod train;

pub use metrics::{label_for, Metrics, THRESHOLD};
pub use pipeline::Pipeline;
