pub mod catalogue;
pub mod cli;
pub mod config;
pub mod detect;
pub mod encoder;
pub mod error;
pub mod gaze;
pub mod index;
mod metrics;
pub mod pipeline;
pub mod quadrant;
pub mod types;
pub mod utils;

pub use catalogue::{Catalogue, CropRecord, IndexEntry};
pub use config::Opts;
pub use error::{AttentionError, GazeError, IndexError};
pub use index::{EmbeddingIndex, Neighbor};
pub use pipeline::{AttentionPipeline, AttentionResult, PipelineSettings};
pub use types::{BoundingBox, Quadrant};
