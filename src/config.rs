use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::gaze::GazeArtifacts;
use crate::pipeline::PipelineSettings;
use crate::types::{BoundingBox, EMBEDDING_DIM, Quadrant};

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "eyedia", "docent").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().expect("config dir is not valid UTF-8")
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 嵌入向量维度，需要与编码器输出一致
    #[arg(long, value_name = "N", default_value_t = EMBEDDING_DIM)]
    pub dimensions: usize,
    /// 存在性阈值，最佳匹配的内积相似度低于该值视为未识别
    #[arg(long, value_name = "SCORE", default_value_t = 0.0, allow_negative_numbers = true)]
    pub min_score: f32,
    /// 返回的作品局部描述数量
    #[arg(short = 'k', long, value_name = "K", default_value_t = 5)]
    pub top_k: usize,
}

impl From<&SearchOptions> for PipelineSettings {
    fn from(opts: &SearchOptions) -> Self {
        Self { min_score: opts.min_score, top_k: opts.top_k }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DetectorOptions {
    /// 作品检测模型（YOLOv8 ONNX）
    #[arg(long, value_name = "PATH", default_value = "yolov8n.onnx")]
    pub detector: PathBuf,
    /// 图片编码模型（CLIP 视觉部分 ONNX）
    #[arg(long, value_name = "PATH", default_value = "clip-vit-b32-visual.onnx")]
    pub encoder: PathBuf,
    /// 检测框最低置信度
    #[arg(long, value_name = "CONF", default_value_t = 0.3)]
    pub confidence: f32,
    /// 检测模型输入尺寸
    #[arg(long, value_name = "SIZE", default_value_t = 640)]
    pub input_size: i32,
}

#[derive(Parser, Debug, Clone)]
pub struct GazeOptions {
    /// 人脸检测 Haar 级联文件名
    #[arg(long, value_name = "FILE", default_value = "haarcascade_frontalface_default.xml")]
    pub face_cascade: String,
    /// 人脸关键点模型文件名
    #[arg(long, value_name = "FILE", default_value = "lbfmodel.yaml")]
    pub landmark_model: String,
    /// 视线区域分类器文件名
    #[arg(long, value_name = "FILE", default_value = "gaze_model.yml")]
    pub zone_model: String,
    /// 视线未知且没有手动指定时使用的象限
    #[arg(long, value_name = "QUADRANT", default_value = "Q2")]
    pub fallback: Quadrant,
}

impl From<&GazeOptions> for GazeArtifacts {
    fn from(opts: &GazeOptions) -> Self {
        Self {
            face_cascade: opts.face_cascade.clone(),
            landmark_model: opts.landmark_model.clone(),
            zone_model: opts.zone_model.clone(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct OverlapOptions {
    /// 命中象限的最小重叠比例
    #[arg(long, value_name = "RATIO", default_value_t = 0.05)]
    pub min_ratio: f64,
    /// 命中象限的最小重叠像素数
    #[arg(long, value_name = "PIXELS", default_value_t = 1)]
    pub min_pixels: i64,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "docent", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 识别图片中的作品
    Identify(IdentifyCommand),
    /// 判断图片中观众的视线区域
    Gaze(GazeCommand),
    /// 解析观众正在注视的作品区域
    Resolve(ResolveCommand),
    /// 从作品目录构建向量索引
    Build(BuildCommand),
    /// 采集视线训练数据
    Collect(CollectCommand),
    /// 使用已采集的数据训练视线分类器
    Train(TrainCommand),
    /// 计算边界框与四个象限的重叠
    Overlap(OverlapCommand),
    /// 实时运行
    Run(RunCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// 返回向量索引文件的路径
    pub fn index(&self) -> PathBuf {
        self.path.join("artworks.usearch")
    }

    /// 返回作品目录文件的路径
    pub fn catalogue(&self) -> PathBuf {
        self.path.join("catalogue.json")
    }

    /// 视线模型所在目录
    pub fn gaze_dir(&self) -> PathBuf {
        self.path.join("gaze")
    }

    /// 返回采集的视线特征路径
    pub fn samples(&self) -> PathBuf {
        self.path.join("gaze_samples.npy")
    }

    /// 返回采集的视线标签路径
    pub fn labels(&self) -> PathBuf {
        self.path.join("gaze_labels.npy")
    }
}

impl std::fmt::Display for ConfDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

pub fn parse_bbox(s: &str) -> anyhow::Result<BoundingBox> {
    let parts = s.split(',').map(|p| p.trim().parse::<i32>()).collect::<Result<Vec<_>, _>>()?;
    let coords: [i32; 4] = parts
        .try_into()
        .map_err(|_| anyhow::anyhow!("无效的边界框: {}，格式为 x1,y1,x2,y2", s))?;
    Ok(BoundingBox::from(coords))
}

pub fn parse_size(s: &str) -> anyhow::Result<(i32, i32)> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("无效的尺寸: {}", s));
    }
    Ok((parts[0].parse()?, parts[1].parse()?))
}

/// 解析画面坐标 x,y
pub fn parse_point(s: &str) -> anyhow::Result<(i32, i32)> {
    match s.split(',').map(|p| p.trim().parse::<i32>()).collect::<Result<Vec<_>, _>>()?[..] {
        [x, y] => Ok((x, y)),
        _ => Err(anyhow::anyhow!("无效的坐标: {}，格式为 x,y", s)),
    }
}
