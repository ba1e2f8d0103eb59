mod build;
mod collect;
mod gaze;
mod identify;
mod overlap;
mod resolve;
mod run;
mod train;

pub use build::*;
pub use collect::*;
pub use gaze::*;
pub use identify::*;
pub use overlap::*;
pub use resolve::*;
pub use run::*;
pub use train::*;

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::debug;

use crate::catalogue::Catalogue;
use crate::config::{ConfDir, DetectorOptions, GazeOptions, Opts, SearchOptions};
use crate::detect::YoloLocalizer;
use crate::encoder::ClipEncoder;
use crate::gaze::{ArtifactLocator, GazeZoneClassifier};
use crate::index::EmbeddingIndex;
use crate::pipeline::{AttentionPipeline, AttentionResult};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> Result<()>;
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

/// 视线分类器，模型在第一次使用时才加载
pub fn gaze_classifier(conf_dir: &ConfDir, gaze: &GazeOptions) -> GazeZoneClassifier {
    let locator = ArtifactLocator::standard(conf_dir.gaze_dir());
    debug!("gaze artifact search path: {:?}", locator.dirs());
    GazeZoneClassifier::new(locator, gaze.into())
}

/// 加载索引、作品目录和所有模型
pub fn open_pipeline(
    conf_dir: &ConfDir,
    search: &SearchOptions,
    detector: &DetectorOptions,
    gaze: &GazeOptions,
) -> Result<AttentionPipeline> {
    let index = EmbeddingIndex::open(conf_dir.index(), search.dimensions)
        .with_context(|| format!("failed to open index {}", conf_dir.index().display()))?;
    let catalogue = Catalogue::open(conf_dir.catalogue())?;
    let localizer =
        YoloLocalizer::load(&detector.detector, detector.input_size, detector.confidence)?;
    let encoder = ClipEncoder::load(&detector.encoder, search.dimensions)?;

    Ok(AttentionPipeline::new(
        Box::new(localizer),
        Box::new(encoder),
        index,
        catalogue,
        gaze_classifier(conf_dir, gaze),
        search.into(),
    ))
}

pub fn print_attention(result: &AttentionResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Table => {
            println!("{}\t{}\t{:.3}", result.id, result.title, result.score);
            println!("{} ({}, {:?})", result.quadrant, result.quadrant.label(), result.source);
            for crop in &result.crops {
                println!("{:.2}\t{}\t{}", crop.ratio, crop.crop_id, crop.description);
            }
        }
    }
    Ok(())
}
