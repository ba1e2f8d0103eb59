use std::path::Path;

use log::debug;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::IndexError;
use crate::types::EmbeddingVector;

/// 一个搜索结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 插入顺序，从 0 开始
    pub position: usize,
    /// 内积相似度，越大越相似
    pub score: f32,
}

impl Neighbor {
    /// 存在性判断：相似度不低于阈值
    pub fn passes(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

/// 作品嵌入向量索引
///
/// 向量需要预先 L2 归一化，此时内积即余弦相似度。
/// 所有分数都是相似度：越大越好，存在性判断为 `score >= threshold`。
pub struct EmbeddingIndex {
    index: Index,
    dimensions: usize,
}

fn backend(e: impl std::fmt::Display) -> IndexError {
    IndexError::Backend(e.to_string())
}

fn path_str(path: &Path) -> Result<&str, IndexError> {
    path.to_str().ok_or_else(|| IndexError::Backend(format!("非 UTF-8 路径: {}", path.display())))
}

impl EmbeddingIndex {
    pub fn new(dimensions: usize) -> Result<Self, IndexError> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::IP,
            quantization: ScalarKind::F32,
            // 作品数量只有几百到几千，搜索时扩大候选集以接近精确搜索
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            ..Default::default()
        };
        let index = Index::new(&options).map_err(backend)?;
        Ok(Self { index, dimensions })
    }

    /// 从文件加载索引
    pub fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self, IndexError> {
        let s = Self::new(dimensions)?;
        s.index.load(path_str(path.as_ref())?).map_err(backend)?;
        if s.index.dimensions() != dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                actual: s.index.dimensions(),
            });
        }
        debug!("loaded {} vectors from {}", s.len(), path.as_ref().display());
        Ok(s)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        self.index.save(path_str(path.as_ref())?).map_err(backend)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dimensions(&self, v: &[f32]) -> Result<(), IndexError> {
        if v.len() != self.dimensions {
            let (expected, actual) = (self.dimensions, v.len());
            return Err(IndexError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }

    /// 追加一批向量，位置从当前大小开始顺延
    pub fn add(&mut self, vectors: &[EmbeddingVector]) -> Result<(), IndexError> {
        for v in vectors {
            self.check_dimensions(v)?;
        }
        let start = self.len();
        self.index.reserve(start + vectors.len()).map_err(backend)?;
        for (i, v) in vectors.iter().enumerate() {
            self.index.add((start + i) as u64, v.as_slice()).map_err(backend)?;
        }
        Ok(())
    }

    /// 搜索最相似的 k 个向量，按分数降序返回
    ///
    /// k 会被限制在索引大小以内；索引为空且 k > 0 时返回 [`IndexError::EmptyIndex`]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dimensions(query)?;
        if k == 0 {
            return Ok(vec![]);
        }
        if self.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        let k = k.min(self.len());
        let matches = self.index.search(query, k).map_err(backend)?;
        let mut neighbors = matches
            .keys
            .iter()
            .zip(&matches.distances)
            // usearch 的内积距离为 1 - dot
            .map(|(&key, &distance)| Neighbor { position: key as usize, score: 1.0 - distance })
            .collect::<Vec<_>>();
        neighbors.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.position.cmp(&b.position)));
        Ok(neighbors)
    }

    /// 取 top-1，通过存在性阈值时返回该结果
    pub fn identify(&self, query: &[f32], threshold: f32) -> Result<Option<Neighbor>, IndexError> {
        Ok(self.search(query, 1)?.into_iter().next().filter(|n| n.passes(threshold)))
    }
}
