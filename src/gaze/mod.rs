//! 视线区域分类
//!
//! 从画面中检测人脸和双眼关键点，计算几何特征后交给训练好的分类器，
//! 得到视线落在四个区域中的哪一个。任何一步失败都只会得到 `unknown`。

mod artifacts;
mod features;
mod keypoints;
mod landmarks;
mod model;

use std::ops::Range;

use log::{debug, warn};
use opencv::core::Mat;

pub use artifacts::*;
pub use features::*;
pub use keypoints::*;
pub use landmarks::*;
pub use model::*;

use crate::error::GazeError;
use crate::metrics;
use crate::types::Quadrant;
use crate::utils::to_gray;

/// 68 点模型中左眼的关键点下标
pub const LEFT_EYE: Range<usize> = 36..42;
/// 68 点模型中右眼的关键点下标
pub const RIGHT_EYE: Range<usize> = 42..48;

/// 从一帧画面中提取双眼特征
///
/// 分类与数据采集共用这一条路径，保证训练和推理的特征一致
pub fn extract_features(
    landmarker: &mut dyn FaceLandmarker,
    frame: &Mat,
) -> Result<EyeFeatures, GazeError> {
    let gray = to_gray(frame)?;
    let face = *landmarker.faces(&gray)?.first().ok_or(GazeError::NoFaceDetected)?;
    let marks = landmarker.landmarks(&gray, face)?;

    let left = extract_eye(&gray, &marks, LEFT_EYE)?;
    let right = extract_eye(&gray, &marks, RIGHT_EYE)?;
    left.zip(right)
        .and_then(|(l, r)| EyeFeatures::from_keypoints(&l, &r))
        .ok_or(GazeError::IncompleteEyeFeatures)
}

/// 加载完成的模型
pub struct GazeModels {
    pub landmarker: Box<dyn FaceLandmarker>,
    pub model: Box<dyn ZoneModel>,
}

impl GazeModels {
    pub fn new(landmarker: Box<dyn FaceLandmarker>, model: Box<dyn ZoneModel>) -> Self {
        Self { landmarker, model }
    }

    /// 按查找顺序加载三个模型文件，任意一个缺失或损坏都会失败
    pub fn load(locator: &ArtifactLocator, artifacts: &GazeArtifacts) -> Result<Self, GazeError> {
        let find = |name: &str| {
            locator.resolve(name).ok_or_else(|| {
                GazeError::DegradedClassifier(format!(
                    "{} not found in {:?}",
                    name,
                    locator.dirs()
                ))
            })
        };
        let cascade = find(&artifacts.face_cascade)?;
        let landmark = find(&artifacts.landmark_model)?;
        let zone = find(&artifacts.zone_model)?;
        debug!("loading gaze models: {:?}, {:?}, {:?}", cascade, landmark, zone);

        let degraded = |e: anyhow::Error| GazeError::DegradedClassifier(format!("{e:#}"));
        let landmarker = OpenCvLandmarker::load(&cascade, &landmark).map_err(degraded)?;
        let model = ForestZoneModel::load(&zone).map_err(degraded)?;
        Ok(Self::new(Box::new(landmarker), Box::new(model)))
    }

    pub fn predict_zone(&mut self, frame: &Mat) -> Result<Quadrant, GazeError> {
        let features = extract_features(self.landmarker.as_mut(), frame)?;
        self.zone_of(&features)
    }

    pub fn zone_of(&self, features: &EyeFeatures) -> Result<Quadrant, GazeError> {
        let zone = self.model.predict(features)?;
        Quadrant::from_zone(zone).ok_or(GazeError::InvalidZone(zone))
    }
}

/// 分类器状态：未初始化 -> 就绪，或者 未初始化 -> 禁用
///
/// 禁用后在进程生命周期内不会再尝试加载
#[derive(Default)]
pub enum ClassifierState {
    #[default]
    Uninitialized,
    Ready(GazeModels),
    Disabled,
}

pub struct GazeZoneClassifier {
    locator: ArtifactLocator,
    artifacts: GazeArtifacts,
    state: ClassifierState,
}

impl GazeZoneClassifier {
    /// 第一次分类时才会加载模型
    pub fn new(locator: ArtifactLocator, artifacts: GazeArtifacts) -> Self {
        Self { locator, artifacts, state: ClassifierState::Uninitialized }
    }

    /// 使用已经加载好的模型
    pub fn with_models(models: GazeModels) -> Self {
        Self {
            locator: ArtifactLocator::default(),
            artifacts: GazeArtifacts::default(),
            state: ClassifierState::Ready(models),
        }
    }

    pub fn state(&self) -> &ClassifierState {
        &self.state
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.state, ClassifierState::Disabled)
    }

    fn ensure_ready(&mut self) -> Result<&mut GazeModels, GazeError> {
        if let ClassifierState::Uninitialized = self.state {
            self.state = match GazeModels::load(&self.locator, &self.artifacts) {
                Ok(models) => ClassifierState::Ready(models),
                Err(e) => {
                    warn!("视线分类已禁用: {}", e);
                    ClassifierState::Disabled
                }
            };
        }
        match &mut self.state {
            ClassifierState::Ready(models) => Ok(models),
            _ => Err(GazeError::DegradedClassifier("models unavailable".to_string())),
        }
    }

    /// 分类并返回失败原因
    pub fn try_classify(&mut self, frame: &Mat) -> Result<Quadrant, GazeError> {
        self.ensure_ready()?.predict_zone(frame)
    }

    /// 返回视线所在区域，任何失败都返回 None
    pub fn classify(&mut self, frame: &Mat) -> Option<Quadrant> {
        let result = self.try_classify(frame);
        metrics::inc_gaze_outcome(&result);
        match result {
            Ok(zone) => Some(zone),
            Err(e) => {
                debug!("gaze unknown: {}", e);
                None
            }
        }
    }
}
