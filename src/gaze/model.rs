//! 视线区域分类器与训练数据

use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use log::info;
use ndarray::{Array1, Array2};
use ndarray_npy::{read_npy, write_npy};
use opencv::core::{self, Mat, Ptr, TermCriteria};
use opencv::ml::{self, RTrees};
use opencv::prelude::*;

use super::features::{EyeFeatures, FEATURE_LEN};
use crate::types::Quadrant;

/// 每个区域需要采集的样本数
pub const SAMPLES_PER_ZONE: usize = 20;
/// 随机森林中树的数量
const FOREST_TREES: i32 = 100;

/// 区域分类器，输出的区域编号应当在 1~4 之间
pub trait ZoneModel {
    fn predict(&self, features: &EyeFeatures) -> Result<i32>;
}

/// 基于 OpenCV 随机森林的分类器
pub struct ForestZoneModel {
    forest: Ptr<RTrees>,
}

impl ForestZoneModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let forest = RTrees::load(&path.to_string_lossy(), "")
            .with_context(|| format!("failed to load zone model {}", path.display()))?;
        ensure!(forest.is_trained()?, "zone model {} is not trained", path.display());
        Ok(Self { forest })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.forest.save(&path.as_ref().to_string_lossy())?;
        Ok(())
    }

    pub fn train(dataset: &GazeDataset) -> Result<Self> {
        if dataset.is_empty() {
            bail!("gaze dataset is empty");
        }
        let samples = Mat::from_slice_2d(&dataset.samples)?;
        let labels = dataset.labels.iter().map(|&l| [l]).collect::<Vec<_>>();
        let responses = Mat::from_slice_2d(&labels)?;

        let mut forest = RTrees::create()?;
        forest.set_max_depth(16)?;
        forest.set_min_sample_count(2)?;
        forest.set_term_criteria(TermCriteria::new(core::TermCriteria_COUNT, FOREST_TREES, 0.0)?)?;
        if !forest.train(&samples, ml::ROW_SAMPLE, &responses)? {
            bail!("failed to train zone model");
        }
        info!("zone model trained on {} samples", dataset.len());
        Ok(Self { forest })
    }
}

impl ZoneModel for ForestZoneModel {
    fn predict(&self, features: &EyeFeatures) -> Result<i32> {
        let sample = Mat::from_slice_2d(&[features.to_array()])?;
        let zone = self.forest.predict(&sample, &mut core::no_array(), 0)?;
        Ok(zone.round() as i32)
    }
}

/// 带区域标签的特征样本
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GazeDataset {
    samples: Vec<[f32; FEATURE_LEN]>,
    labels: Vec<i32>,
}

impl GazeDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, features: &EyeFeatures, zone: Quadrant) {
        self.samples.push(features.to_array());
        self.labels.push(zone.zone());
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 每个区域的样本数
    pub fn counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for zone in self.labels.iter().filter_map(|&l| Quadrant::from_zone(l)) {
            counts[zone as usize] += 1;
        }
        counts
    }

    pub fn save_npy(&self, samples: impl AsRef<Path>, labels: impl AsRef<Path>) -> Result<()> {
        let flat = self.samples.iter().flatten().copied().collect::<Vec<_>>();
        let x = Array2::from_shape_vec((self.len(), FEATURE_LEN), flat)?;
        let y = Array1::from_vec(self.labels.clone());
        write_npy(samples, &x)?;
        write_npy(labels, &y)?;
        Ok(())
    }

    pub fn load_npy(samples: impl AsRef<Path>, labels: impl AsRef<Path>) -> Result<Self> {
        let x: Array2<f32> = read_npy(samples.as_ref())
            .with_context(|| format!("failed to read {}", samples.as_ref().display()))?;
        let y: Array1<i32> = read_npy(labels.as_ref())
            .with_context(|| format!("failed to read {}", labels.as_ref().display()))?;
        ensure!(x.ncols() == FEATURE_LEN, "expected {FEATURE_LEN} features, got {}", x.ncols());
        ensure!(x.nrows() == y.len(), "{} samples but {} labels", x.nrows(), y.len());

        let samples = x
            .rows()
            .into_iter()
            .map(|row| {
                let mut s = [0f32; FEATURE_LEN];
                s.iter_mut().zip(row.iter()).for_each(|(d, v)| *d = *v);
                s
            })
            .collect();
        Ok(Self { samples, labels: y.to_vec() })
    }
}

/// 交互式采集的进度：依次为区域 1~4 各采集 [`SAMPLES_PER_ZONE`] 个样本
#[derive(Debug, Default)]
pub struct Collector {
    dataset: GazeDataset,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前正在采集的区域，全部采集完成后返回 None
    pub fn current_zone(&self) -> Option<Quadrant> {
        let counts = self.dataset.counts();
        Quadrant::ALL.into_iter().find(|q| counts[*q as usize] < SAMPLES_PER_ZONE)
    }

    /// 记录一个样本，返回该样本所属的区域
    pub fn record(&mut self, features: &EyeFeatures) -> Option<Quadrant> {
        let zone = self.current_zone()?;
        self.dataset.push(features, zone);
        Some(zone)
    }

    pub fn is_complete(&self) -> bool {
        self.current_zone().is_none()
    }

    pub fn dataset(&self) -> &GazeDataset {
        &self.dataset
    }
}
