use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use serde_json::json;

use crate::cli::{OutputFormat, SubCommandExtend, open_pipeline};
use crate::config::{DetectorOptions, GazeOptions, Opts, SearchOptions};
use crate::utils::imread;

#[derive(Parser, Debug, Clone)]
pub struct IdentifyCommand {
    #[command(flatten)]
    pub search: SearchOptions,
    #[command(flatten)]
    pub detector: DetectorOptions,
    #[command(flatten)]
    pub gaze: GazeOptions,
    /// 作品图片路径
    pub image: PathBuf,
    /// 图片为完整画面，需要先定位作品
    #[arg(long)]
    pub scene: bool,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for IdentifyCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let image = imread(&self.image)?;
        let mut pipeline = open_pipeline(&opts.conf_dir, &self.search, &self.detector, &self.gaze)?;

        let result = if self.scene {
            pipeline.identify_scene(&image)
        } else {
            pipeline.identify(&image)
        };
        let (entry, score) = match result {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                info!("未识别到作品: {}", e);
                if self.output_format == OutputFormat::Json {
                    println!("null");
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match self.output_format {
            OutputFormat::Json => {
                let value = json!({ "score": score, "entry": entry });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Table => {
                println!("{:.3}\t{}\t{}\t{}", score, entry.id, entry.title, entry.artist);
                if !entry.summary.is_empty() {
                    println!("{}", entry.summary);
                }
            }
        }
        Ok(())
    }
}
