//! 图片嵌入

use std::path::Path;

use anyhow::{Context, Result, ensure};
use opencv::core::{self, Mat, Rect, Scalar, Size, Vec3b};
use opencv::dnn::{self, Net};
use opencv::imgproc;
use opencv::prelude::*;

use crate::types::EmbeddingVector;
use crate::utils::l2_normalize;

/// 将图片编码为 L2 归一化的嵌入向量
pub trait ImageEncoder {
    fn encode(&mut self, image: &Mat) -> Result<EmbeddingVector>;
}

const CLIP_SIZE: i32 = 224;
const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// CLIP 视觉编码器的 ONNX 导出
pub struct ClipEncoder {
    net: Net,
    dimensions: usize,
}

impl ClipEncoder {
    pub fn load(model: impl AsRef<Path>, dimensions: usize) -> Result<Self> {
        let model = model.as_ref();
        let net = dnn::read_net_from_onnx(&model.to_string_lossy())
            .with_context(|| format!("failed to load encoder {}", model.display()))?;
        Ok(Self { net, dimensions })
    }
}

/// 短边缩放到 224 后居中裁剪，按 CLIP 的均值方差归一化，输出 NCHW 的 RGB 数据
pub fn clip_preprocess(image: &Mat) -> Result<Vec<f32>> {
    let (w, h) = (image.cols(), image.rows());
    ensure!(w > 0 && h > 0, "empty image");
    let scale = CLIP_SIZE as f64 / w.min(h) as f64;
    let size = Size::new(
        ((w as f64 * scale).round() as i32).max(CLIP_SIZE),
        ((h as f64 * scale).round() as i32).max(CLIP_SIZE),
    );
    let mut resized = Mat::default();
    imgproc::resize(image, &mut resized, size, 0., 0., imgproc::INTER_CUBIC)?;

    let x = (size.width - CLIP_SIZE) / 2;
    let y = (size.height - CLIP_SIZE) / 2;
    let cropped = Mat::roi(&resized, Rect::new(x, y, CLIP_SIZE, CLIP_SIZE))?.try_clone()?;

    let plane = (CLIP_SIZE * CLIP_SIZE) as usize;
    let mut chw = vec![0f32; plane * 3];
    for (i, px) in cropped.data_typed::<Vec3b>()?.iter().enumerate() {
        // BGR -> RGB
        for c in 0..3 {
            let v = px[2 - c] as f32 / 255.0;
            chw[c * plane + i] = (v - CLIP_MEAN[c]) / CLIP_STD[c];
        }
    }
    Ok(chw)
}

impl ImageEncoder for ClipEncoder {
    fn encode(&mut self, image: &Mat) -> Result<EmbeddingVector> {
        let image = crate::utils::to_bgr(image)?;
        let chw = clip_preprocess(&image)?;
        let mut blob = Mat::new_nd_with_default(
            &[1, 3, CLIP_SIZE, CLIP_SIZE],
            core::CV_32F,
            Scalar::default(),
        )?;
        blob.data_typed_mut::<f32>()?.copy_from_slice(&chw);

        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;
        let mut embedding = output.data_typed::<f32>()?.to_vec();
        ensure!(
            embedding.len() == self.dimensions,
            "encoder returned {} dimensions, expected {}",
            embedding.len(),
            self.dimensions
        );
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}
