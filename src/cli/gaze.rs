use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use log::info;
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use opencv::{highgui, imgproc};
use serde_json::json;

use crate::cli::{OutputFormat, SubCommandExtend, gaze_classifier};
use crate::config::{GazeOptions, Opts};
use crate::gaze::GazeZoneClassifier;
use crate::types::Quadrant;
use crate::utils::{frame_size, imread};

const WINDOW: &str = "docent gaze";

#[derive(Parser, Debug, Clone)]
pub struct GazeCommand {
    #[command(flatten)]
    pub gaze: GazeOptions,
    /// 包含观众人脸的图片路径
    #[arg(required_unless_present = "camera")]
    pub image: Option<PathBuf>,
    /// 从摄像头实时预览视线区域，按 q 退出
    #[arg(long, value_name = "INDEX", conflicts_with = "image")]
    pub camera: Option<i32>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for GazeCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let mut classifier = gaze_classifier(&opts.conf_dir, &self.gaze);
        let image = match (&self.image, self.camera) {
            (_, Some(camera)) => return live_preview(&mut classifier, camera),
            (Some(image), None) => imread(image)?,
            (None, None) => bail!("需要图片路径或 --camera"),
        };
        let zone = classifier.classify(&image);

        match self.output_format {
            OutputFormat::Json => {
                let value = json!({
                    "zone": zone.map(|q| q.zone()),
                    "quadrant": zone,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Table => match zone {
                Some(q) => println!("{}\t{}", q, q.label()),
                None => println!("unknown"),
            },
        }
        Ok(())
    }
}

fn live_preview(classifier: &mut GazeZoneClassifier, camera: i32) -> Result<()> {
    let mut cap = VideoCapture::new(camera, videoio::CAP_ANY)?;
    if !cap.is_opened()? {
        bail!("无法打开摄像头 {}", camera);
    }

    info!("q：退出");
    let mut frame = Mat::default();
    loop {
        if !cap.read(&mut frame)? || frame.empty() {
            bail!("摄像头 {} 没有返回画面", camera);
        }
        let zone = classifier.classify(&frame);
        let mut preview = frame.try_clone()?;
        draw_zone(&mut preview, zone)?;
        highgui::imshow(WINDOW, &preview)?;
        if highgui::wait_key(1)? == 'q' as i32 {
            break;
        }
    }

    highgui::destroy_all_windows()?;
    Ok(())
}

/// 高亮预测的象限，并在左上角写出区域名
fn draw_zone(frame: &mut Mat, zone: Option<Quadrant>) -> Result<()> {
    let green = Scalar::new(0., 255., 0., 0.);
    let text = match zone {
        Some(q) => {
            let (w, h) = frame_size(frame);
            imgproc::rectangle(frame, Rect::from(q.rect(w, h)), green, 3, imgproc::LINE_8, 0)?;
            format!("{} ({})", q, q.label())
        }
        None => "unknown".to_string(),
    };
    imgproc::put_text(
        frame,
        &text,
        Point::new(10, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        green,
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use opencv::core::{CV_8UC3, Vec3b};

    use super::*;

    #[test]
    fn predicted_quadrant_is_highlighted() -> Result<()> {
        let black = || Mat::new_rows_cols_with_default(100, 200, CV_8UC3, Scalar::all(0.));

        let mut frame = black()?;
        draw_zone(&mut frame, Some(Quadrant::Q2))?;
        assert_eq!(frame.at_2d::<Vec3b>(0, 150)?.0, [0, 255, 0]);
        assert_eq!(frame.at_2d::<Vec3b>(99, 150)?.0, [0, 0, 0]);

        let mut frame = black()?;
        draw_zone(&mut frame, None)?;
        assert_eq!(frame.at_2d::<Vec3b>(0, 150)?.0, [0, 0, 0]);
        Ok(())
    }
}
