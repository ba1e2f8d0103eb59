use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::ProgressStyle;
use log::debug;
use opencv::core::{self, Mat, Rect};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

use crate::types::BoundingBox;

/// 以彩色模式读取图片，文件不存在或无法解码时返回错误
pub fn imread(path: impl AsRef<Path>) -> opencv::Result<Mat> {
    let path = path.as_ref();
    let img = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        return Err(opencv::Error::new(
            core::StsError,
            format!("无法读取图片: {}", path.display()),
        ));
    }
    Ok(img)
}

pub fn imwrite(path: impl AsRef<Path>, img: &impl core::ToInputArray) -> opencv::Result<bool> {
    let flags = core::Vector::<i32>::new();
    imgcodecs::imwrite(&path.as_ref().to_string_lossy(), img, &flags)
}

/// 转换为灰度图，已经是单通道的图片直接复制
pub fn to_gray(frame: &Mat) -> opencv::Result<Mat> {
    if frame.channels() == 1 {
        return frame.try_clone();
    }
    let mut gray = Mat::default();
    imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

/// 转换为三通道 BGR
pub fn to_bgr(frame: &Mat) -> opencv::Result<Mat> {
    if frame.channels() == 3 {
        return frame.try_clone();
    }
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(frame, &mut bgr, imgproc::COLOR_GRAY2BGR)?;
    Ok(bgr)
}

/// 画面尺寸 (width, height)
pub fn frame_size(frame: &Mat) -> (i32, i32) {
    (frame.cols(), frame.rows())
}

/// 裁剪出边界框对应的区域，返回连续存储的副本
pub fn crop(frame: &Mat, bbox: BoundingBox) -> opencv::Result<Mat> {
    let (w, h) = frame_size(frame);
    let rect = Rect::from(bbox.clip(w, h));
    Mat::roi(frame, rect)?.try_clone()
}

/// 原地 L2 归一化，零向量保持不变
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {per_sec} ({eta}) {msg}",
    )
    .expect("invalid progress style")
    .progress_chars("##-")
}

/// 按阶段累计耗时
#[derive(Debug, Default)]
pub struct TimeMeasure(pub HashMap<&'static str, Duration>);

impl TimeMeasure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn measure<F, R>(&mut self, key: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let r = f();
        *self.0.entry(key).or_default() += start.elapsed();
        r
    }

    pub fn log(&self) {
        let mut stages = self.0.iter().collect::<Vec<_>>();
        stages.sort_by_key(|(k, _)| *k);
        for (stage, elapsed) in stages {
            debug!("{:<10}: {:.2}ms", stage, elapsed.as_secs_f64() * 1000.);
        }
    }
}

#[cfg(test)]
mod tests {
    use opencv::core::{CV_8UC3, Scalar};

    use super::*;

    #[test]
    fn normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 3];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 3]);
    }

    #[test]
    fn crop_is_clipped() -> opencv::Result<()> {
        let frame = Mat::new_rows_cols_with_default(40, 60, CV_8UC3, Scalar::all(7.))?;
        let c = crop(&frame, BoundingBox::new(50, 30, 80, 90))?;
        assert_eq!(frame_size(&c), (10, 10));
        assert_eq!(to_gray(&c)?.channels(), 1);
        Ok(())
    }
}
