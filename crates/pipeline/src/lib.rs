//! Analysis pipeline and its external collaborators: the pose service,
//! ffprobe/ffmpeg and the overlay renderer.

pub mod error;
pub mod ffmpeg;
pub mod font;
pub mod frames;
pub mod overlay;
pub mod pipeline;
pub mod pose_source;
pub mod probe;

pub use error::PipelineError;
pub use pipeline::{
    AnalysisPipeline, AnalyzedVideo, PipelineConfig, PipelineOutput, ProgressSink, ResultPaths,
};
