//! 作品定位

use std::path::Path;

use anyhow::{Context, Result, ensure};
use log::debug;
use opencv::core::{self, Mat, Rect, Scalar, Size, Vector};
use opencv::dnn::{self, Net};
use opencv::prelude::*;

use crate::types::BoundingBox;

/// 一个检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// 在画面中定位候选作品
pub trait ObjectLocalizer {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>>;
}

/// 选出 置信度 * sqrt(面积) 最大的检测框，跳过面积为 0 的框
///
/// 大而清晰的作品通常就是观众正在看的那一件
pub fn best_detection(detections: &[Detection]) -> Option<Detection> {
    detections
        .iter()
        .filter(|d| !d.bbox.is_empty())
        .map(|d| (d.confidence as f64 * (d.bbox.area() as f64).sqrt(), d))
        .fold(None, |best: Option<(f64, &Detection)>, (score, d)| match best {
            Some((s, _)) if s >= score => best,
            _ => Some((score, d)),
        })
        .map(|(_, d)| *d)
}

/// 通过 OpenCV DNN 运行 YOLOv8 ONNX 模型
pub struct YoloLocalizer {
    net: Net,
    input_size: i32,
    confidence: f32,
    nms_threshold: f32,
}

impl YoloLocalizer {
    pub fn load(model: impl AsRef<Path>, input_size: i32, confidence: f32) -> Result<Self> {
        let model = model.as_ref();
        let net = dnn::read_net_from_onnx(&model.to_string_lossy())
            .with_context(|| format!("failed to load detector {}", model.display()))?;
        Ok(Self { net, input_size, confidence, nms_threshold: 0.45 })
    }
}

impl ObjectLocalizer for YoloLocalizer {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>> {
        let size = self.input_size;
        let blob = dnn::blob_from_image(
            frame,
            1.0 / 255.0,
            Size::new(size, size),
            Scalar::default(),
            true,
            false,
            core::CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;

        // [1, 4 + 类别数, 候选数]
        let shape = output.mat_size();
        ensure!(shape.len() == 3 && shape[1] > 4, "unexpected detector output shape {:?}", &*shape);
        let (rows, cols) = (shape[1] as usize, shape[2] as usize);
        let data = output.data_typed::<f32>()?;

        let sx = frame.cols() as f32 / size as f32;
        let sy = frame.rows() as f32 / size as f32;
        let mut boxes = Vector::<Rect>::new();
        let mut scores = Vector::<f32>::new();
        for j in 0..cols {
            let at = |r: usize| data[r * cols + j];
            let confidence = (4..rows).map(at).fold(f32::MIN, f32::max);
            if confidence < self.confidence {
                continue;
            }
            let (cx, cy, w, h) = (at(0) * sx, at(1) * sy, at(2) * sx, at(3) * sy);
            boxes.push(Rect::new(
                (cx - w / 2.0) as i32,
                (cy - h / 2.0) as i32,
                w as i32,
                h as i32,
            ));
            scores.push(confidence);
        }

        let mut keep = Vector::<i32>::new();
        dnn::nms_boxes(&boxes, &scores, self.confidence, self.nms_threshold, &mut keep, 1.0, 0)?;
        let detections = keep
            .iter()
            .map(|i| {
                Ok(Detection {
                    bbox: BoundingBox::from(boxes.get(i as usize)?),
                    confidence: scores.get(i as usize)?,
                })
            })
            .collect::<opencv::Result<Vec<_>>>()?;
        debug!("detected {} candidates", detections.len());
        Ok(detections)
    }
}
