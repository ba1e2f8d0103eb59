use std::fs;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use opencv::core::{Mat, Point, Scalar};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use opencv::{highgui, imgproc};

use crate::cli::SubCommandExtend;
use crate::config::{ConfDir, GazeOptions, Opts};
use crate::gaze::{
    ArtifactLocator, Collector, ForestZoneModel, OpenCvLandmarker, SAMPLES_PER_ZONE,
    extract_features,
};

const WINDOW: &str = "docent collect";

#[derive(Parser, Debug, Clone)]
pub struct CollectCommand {
    #[command(flatten)]
    pub gaze: GazeOptions,
    /// 拍摄观众人脸的摄像头编号
    #[arg(long, value_name = "INDEX", default_value_t = 0)]
    pub camera: i32,
}

impl SubCommandExtend for CollectCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let locator = ArtifactLocator::standard(opts.conf_dir.gaze_dir());
        let find = |name: &str| {
            locator
                .resolve(name)
                .with_context(|| format!("{} not found in {:?}", name, locator.dirs()))
        };
        let mut landmarker = OpenCvLandmarker::load(
            find(&self.gaze.face_cascade)?,
            find(&self.gaze.landmark_model)?,
        )?;

        let mut cap = VideoCapture::new(self.camera, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            bail!("无法打开摄像头 {}", self.camera);
        }

        info!("空格：采集当前区域样本，s：训练并保存，q：退出");
        let mut collector = Collector::new();
        let mut frame = Mat::default();
        loop {
            if !cap.read(&mut frame)? || frame.empty() {
                save_partial(&collector, &opts.conf_dir)?;
                bail!("摄像头 {} 没有返回画面", self.camera);
            }
            let mut preview = frame.try_clone()?;
            draw_status(&mut preview, &collector)?;
            highgui::imshow(WINDOW, &preview)?;

            match highgui::wait_key(1)? {
                k if k == ' ' as i32 => match extract_features(&mut landmarker, &frame) {
                    Ok(features) => {
                        if let Some(zone) = collector.record(&features) {
                            let n = collector.dataset().counts()[zone as usize];
                            info!("{} ({}) {}/{}", zone, zone.label(), n, SAMPLES_PER_ZONE);
                        }
                    }
                    Err(e) => warn!("采集失败: {}", e),
                },
                k if k == 's' as i32 => {
                    if !collector.is_complete() {
                        warn!("样本未采集完成: {:?}", collector.dataset().counts());
                        continue;
                    }
                    let dataset = collector.dataset();
                    fs::create_dir_all(opts.conf_dir.gaze_dir())?;
                    dataset.save_npy(opts.conf_dir.samples(), opts.conf_dir.labels())?;
                    let model = ForestZoneModel::train(dataset)?;
                    let path = opts.conf_dir.gaze_dir().join(&self.gaze.zone_model);
                    model.save(&path)?;
                    info!("模型已保存到 {}", path.display());
                    break;
                }
                k if k == 'q' as i32 => {
                    save_partial(&collector, &opts.conf_dir)?;
                    break;
                }
                _ => {}
            }
        }

        highgui::destroy_all_windows()?;
        Ok(())
    }
}

/// 退出前保存已采集的样本
fn save_partial(collector: &Collector, conf_dir: &ConfDir) -> Result<()> {
    let dataset = collector.dataset();
    if dataset.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(conf_dir.gaze_dir())?;
    dataset.save_npy(conf_dir.samples(), conf_dir.labels())?;
    info!("已保存 {} 个样本", dataset.len());
    Ok(())
}

fn draw_status(frame: &mut Mat, collector: &Collector) -> Result<()> {
    let text = match collector.current_zone() {
        Some(zone) => format!(
            "look at {} ({}) {}/{}",
            zone,
            zone.label(),
            collector.dataset().counts()[zone as usize],
            SAMPLES_PER_ZONE
        ),
        None => "done, press s to train".to_string(),
    };
    imgproc::put_text(
        frame,
        &text,
        Point::new(10, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        Scalar::new(0., 255., 0., 0.),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}
