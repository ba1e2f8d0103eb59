//! 注视解析：识别作品 -> 确定象限 -> 排序作品的子区域

use std::time::Instant;

use log::{debug, info};
use opencv::core::Mat;
use serde::Serialize;

use crate::catalogue::{Catalogue, IndexEntry};
use crate::detect::{ObjectLocalizer, best_detection};
use crate::encoder::ImageEncoder;
use crate::error::{AttentionError, IndexError};
use crate::gaze::GazeZoneClassifier;
use crate::index::{EmbeddingIndex, Neighbor};
use crate::metrics;
use crate::quadrant::rank_crops;
use crate::types::Quadrant;
use crate::utils::{TimeMeasure, crop, frame_size};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// 存在性阈值，top-1 相似度不低于该值才算识别成功
    pub min_score: f32,
    /// 返回的 crop 数量上限
    pub top_k: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { min_score: 0.0, top_k: 5 }
    }
}

/// 当前象限的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuadrantSource {
    Manual,
    Gaze,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCrop {
    pub crop_id: String,
    /// 与当前象限的重叠比例
    pub ratio: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttentionResult {
    /// 作品在索引中的位置
    pub position: usize,
    pub id: String,
    pub title: String,
    pub artist: String,
    pub score: f32,
    pub quadrant: Quadrant,
    pub source: QuadrantSource,
    pub crops: Vec<RankedCrop>,
}

pub struct AttentionPipeline {
    localizer: Box<dyn ObjectLocalizer>,
    encoder: Box<dyn ImageEncoder>,
    index: EmbeddingIndex,
    catalogue: Catalogue,
    gaze: GazeZoneClassifier,
    settings: PipelineSettings,
}

impl AttentionPipeline {
    pub fn new(
        localizer: Box<dyn ObjectLocalizer>,
        encoder: Box<dyn ImageEncoder>,
        index: EmbeddingIndex,
        catalogue: Catalogue,
        gaze: GazeZoneClassifier,
        settings: PipelineSettings,
    ) -> Self {
        catalogue.check_alignment(index.len());
        Self { localizer, encoder, index, catalogue, gaze, settings }
    }

    pub fn gaze(&self) -> &GazeZoneClassifier {
        &self.gaze
    }

    /// 定位画面中的作品并裁剪出来
    pub fn localize(&mut self, frame: &Mat) -> Result<Mat, AttentionError> {
        let detections = self.localizer.detect(frame)?;
        let best = best_detection(&detections).ok_or(AttentionError::NoObjectDetected)?;
        let (w, h) = frame_size(frame);
        if best.bbox.clip(w, h).is_empty() {
            return Err(AttentionError::MalformedBoundingBox(best.bbox));
        }
        debug!("best detection {:?} ({:.2})", best.bbox, best.confidence);
        Ok(crop(frame, best.bbox)?)
    }

    /// 在索引中查找最相似的作品，未通过存在性阈值时返回 [`AttentionError::NoMatch`]
    pub fn match_artwork(&mut self, image: &Mat) -> Result<Neighbor, AttentionError> {
        let embedding = self.encoder.encode(image)?;
        let top = self
            .index
            .search(&embedding, 1)?
            .into_iter()
            .next()
            .ok_or(AttentionError::Index(IndexError::EmptyIndex))?;
        metrics::observe_match_score(top.score);

        let threshold = self.settings.min_score;
        if !top.passes(threshold) {
            return Err(AttentionError::NoMatch { score: top.score, threshold });
        }
        Ok(top)
    }

    /// 识别已经裁剪好的作品图片
    pub fn identify(&mut self, image: &Mat) -> Result<(&IndexEntry, f32), AttentionError> {
        let top = self.match_artwork(image)?;
        let entry = self.entry(top.position)?;
        Ok((entry, top.score))
    }

    /// 先定位再识别
    pub fn identify_scene(&mut self, scene: &Mat) -> Result<(&IndexEntry, f32), AttentionError> {
        let image = self.localize(scene)?;
        self.identify(&image)
    }

    /// 只判断视线区域，失败时返回 None
    pub fn classify_gaze(&mut self, eye: &Mat) -> Option<Quadrant> {
        self.gaze.classify(eye)
    }

    fn entry(&self, position: usize) -> Result<&IndexEntry, AttentionError> {
        self.catalogue.get(position).ok_or(AttentionError::MissingEntry(position))
    }

    /// 确定当前象限：手动指定 > 视线分类 > 调用方保存的回退象限
    fn active_quadrant(
        &mut self,
        eye: Option<&Mat>,
        manual: Option<Quadrant>,
        fallback: Quadrant,
    ) -> (Quadrant, QuadrantSource) {
        if let Some(q) = manual {
            return (q, QuadrantSource::Manual);
        }
        match eye.and_then(|eye| self.gaze.classify(eye)) {
            Some(q) => (q, QuadrantSource::Gaze),
            None => (fallback, QuadrantSource::Fallback),
        }
    }

    /// 解析观众正在注视的作品区域
    ///
    /// 任何一步失败都会直接返回错误，不会有部分结果。
    /// `fallback` 为视线未知时使用的象限，由调用方维护。
    pub fn resolve(
        &mut self,
        scene: &Mat,
        eye: Option<&Mat>,
        manual: Option<Quadrant>,
        fallback: Quadrant,
    ) -> Result<AttentionResult, AttentionError> {
        let start = Instant::now();
        let result = self.resolve_inner(scene, eye, manual, fallback);
        metrics::observe_resolve_duration(start.elapsed());
        metrics::inc_resolve_outcome(&result);
        result
    }

    /// 以画面中的一个坐标（例如点击位置）所在的象限作为手动象限解析
    pub fn resolve_at(
        &mut self,
        scene: &Mat,
        x: i32,
        y: i32,
    ) -> Result<AttentionResult, AttentionError> {
        let (w, h) = frame_size(scene);
        let q = Quadrant::of_point(x, y, w, h);
        debug!("point ({}, {}) -> {}", x, y, q);
        self.resolve(scene, None, Some(q), q)
    }

    fn resolve_inner(
        &mut self,
        scene: &Mat,
        eye: Option<&Mat>,
        manual: Option<Quadrant>,
        fallback: Quadrant,
    ) -> Result<AttentionResult, AttentionError> {
        let mut tm = TimeMeasure::new();

        let image = tm.measure("localize", || self.localize(scene))?;
        let top = tm.measure("match", || self.match_artwork(&image))?;
        self.entry(top.position)?;
        let (quadrant, source) = tm.measure("gaze", || self.active_quadrant(eye, manual, fallback));

        let top_k = self.settings.top_k;
        let entry = self.entry(top.position)?;
        let crops = tm.measure("rank", || {
            rank_crops(&entry.crops, quadrant, top_k)
                .into_iter()
                .map(|c| RankedCrop {
                    crop_id: c.crop_id.clone(),
                    ratio: c.ratio(quadrant),
                    description: c.description.clone(),
                })
                .collect::<Vec<_>>()
        });
        tm.log();

        info!(
            "{} ({:.3}) {} [{:?}], {} crops",
            entry.title,
            top.score,
            quadrant,
            source,
            crops.len()
        );
        Ok(AttentionResult {
            position: top.position,
            id: entry.id.clone(),
            title: entry.title.clone(),
            artist: entry.artist.clone(),
            score: top.score,
            quadrant,
            source,
            crops,
        })
    }
}
