use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::{OutputFormat, SubCommandExtend, open_pipeline, print_attention};
use crate::config::{DetectorOptions, GazeOptions, Opts, SearchOptions, parse_point};
use crate::types::Quadrant;
use crate::utils::imread;

#[derive(Parser, Debug, Clone)]
pub struct ResolveCommand {
    #[command(flatten)]
    pub search: SearchOptions,
    #[command(flatten)]
    pub detector: DetectorOptions,
    #[command(flatten)]
    pub gaze: GazeOptions,
    /// 场景图片路径
    pub scene: PathBuf,
    /// 观众人脸图片路径，用于判断视线区域
    #[arg(long, value_name = "PATH")]
    pub eye: Option<PathBuf>,
    /// 手动指定象限，优先于视线判断
    #[arg(short, long, value_name = "QUADRANT")]
    pub quadrant: Option<Quadrant>,
    /// 场景画面中的坐标（例如点击位置），取其所在象限
    #[arg(
        long,
        value_name = "X,Y",
        value_parser = parse_point,
        conflicts_with_all = ["quadrant", "eye"]
    )]
    pub point: Option<(i32, i32)>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for ResolveCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let scene = imread(&self.scene)?;
        let eye = self.eye.as_ref().map(imread).transpose()?;
        let mut pipeline =
            open_pipeline(&opts.conf_dir, &self.search, &self.detector, &self.gaze)?;

        let result = match self.point {
            Some((x, y)) => pipeline.resolve_at(&scene, x, y),
            None => pipeline.resolve(&scene, eye.as_ref(), self.quadrant, self.gaze.fallback),
        };
        match result {
            Ok(result) => print_attention(&result, self.output_format),
            Err(e) if e.is_not_found() => {
                info!("未识别到作品，请重试: {}", e);
                if self.output_format == OutputFormat::Json {
                    println!("null");
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
