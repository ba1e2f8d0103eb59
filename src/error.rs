//! 错误类型

use thiserror::Error;

use crate::types::BoundingBox;

/// 向量索引错误
#[derive(Error, Debug)]
pub enum IndexError {
    /// 在空索引上搜索
    #[error("index is empty")]
    EmptyIndex,

    /// 向量维度与索引不一致
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// usearch 返回的错误
    #[error("usearch: {0}")]
    Backend(String),
}

/// 视线分类失败的原因
///
/// 调用方只会看到 `unknown`，这里的区分用于日志和指标
#[derive(Error, Debug)]
pub enum GazeError {
    /// 模型文件缺失或加载失败，分类器在进程生命周期内保持禁用
    #[error("gaze classifier disabled: {0}")]
    DegradedClassifier(String),

    #[error("no face detected")]
    NoFaceDetected,

    /// 瞳孔或反光点缺失
    #[error("incomplete eye features")]
    IncompleteEyeFeatures,

    /// 分类器输出了 1~4 以外的区域
    #[error("classifier returned invalid zone {0}")]
    InvalidZone(i32),

    #[error(transparent)]
    Vision(#[from] opencv::Error),

    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

/// 注视解析失败的原因
#[derive(Error, Debug)]
pub enum AttentionError {
    /// 画面中没有检测到作品
    #[error("no artwork detected in frame")]
    NoObjectDetected,

    /// 最佳匹配未通过存在性阈值
    #[error("no catalogue match: best score {score:.3} below threshold {threshold:.3}")]
    NoMatch { score: f32, threshold: f32 },

    /// 检测框裁剪后面积为 0
    #[error("malformed bounding box {0:?}")]
    MalformedBoundingBox(BoundingBox),

    /// 索引位置在作品目录中没有对应条目
    #[error("index position {0} has no catalogue entry")]
    MissingEntry(usize),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Vision(#[from] opencv::Error),

    /// 外部协作者（检测器、编码器）的错误
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl AttentionError {
    /// 是否属于“未找到”一类，调用方应提示重试而非报错
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AttentionError::NoObjectDetected
                | AttentionError::NoMatch { .. }
                | AttentionError::MalformedBoundingBox(_)
                | AttentionError::MissingEntry(_)
                | AttentionError::Index(IndexError::EmptyIndex)
        )
    }
}
