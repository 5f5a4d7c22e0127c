pub mod consts;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod metadata;
pub mod nim;
pub mod pipeline;

// Re-export commonly used types
pub use engine::{
    executor::{AnalysisExecutor, CodeSynthesis},
    loader::LoadState,
};
pub use error::FramelensError;
pub use pipeline::driver::{BatchOutput, FrameResult, Pipeline, PipelineConfig, PipelineConfigBuilder};
