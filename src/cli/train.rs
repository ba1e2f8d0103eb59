use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{GazeOptions, Opts};
use crate::gaze::{ForestZoneModel, GazeDataset};

#[derive(Parser, Debug, Clone)]
pub struct TrainCommand {
    #[command(flatten)]
    pub gaze: GazeOptions,
    /// 特征文件，默认为配置目录下的 gaze_samples.npy
    #[arg(long, value_name = "PATH")]
    pub samples: Option<PathBuf>,
    /// 标签文件，默认为配置目录下的 gaze_labels.npy
    #[arg(long, value_name = "PATH")]
    pub labels: Option<PathBuf>,
}

impl SubCommandExtend for TrainCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let samples = self.samples.clone().unwrap_or_else(|| opts.conf_dir.samples());
        let labels = self.labels.clone().unwrap_or_else(|| opts.conf_dir.labels());
        let dataset = GazeDataset::load_npy(samples, labels)?;
        info!("样本分布: {:?}", dataset.counts());

        let model = ForestZoneModel::train(&dataset)?;
        fs::create_dir_all(opts.conf_dir.gaze_dir())?;
        let path = opts.conf_dir.gaze_dir().join(&self.gaze.zone_model);
        model.save(&path)?;
        info!("模型已保存到 {}", path.display());
        Ok(())
    }
}
