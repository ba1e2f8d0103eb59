use std::env;
use std::path::{Path, PathBuf};

/// 视线分类所需的模型文件名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GazeArtifacts {
    /// 人脸检测器（Haar 级联）
    pub face_cascade: String,
    /// 68 点人脸关键点模型（LBF）
    pub landmark_model: String,
    /// 训练好的区域分类器
    pub zone_model: String,
}

impl Default for GazeArtifacts {
    fn default() -> Self {
        Self {
            face_cascade: "haarcascade_frontalface_default.xml".to_string(),
            landmark_model: "lbfmodel.yaml".to_string(),
            zone_model: "gaze_model.yml".to_string(),
        }
    }
}

/// 按固定优先级在若干目录中查找模型文件，第一个存在的文件胜出
#[derive(Debug, Clone, Default)]
pub struct ArtifactLocator {
    dirs: Vec<PathBuf>,
}

impl ArtifactLocator {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// 默认查找顺序：
    ///
    /// 1. 当前目录
    /// 2. 可执行文件所在目录
    /// 3. 当前目录下的 `data/gaze`
    /// 4. 可执行文件目录下的 `data/gaze`
    /// 5. 可执行文件上级目录下的 `data/gaze`
    /// 6. 配置目录下的 `gaze`
    pub fn standard(conf_gaze_dir: impl Into<PathBuf>) -> Self {
        let cwd = env::current_dir().ok();
        let here = env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf));
        let parent = here.as_deref().and_then(Path::parent).map(Path::to_path_buf);

        let candidates = [
            cwd.clone(),
            here.clone(),
            cwd.map(|p| p.join("data").join("gaze")),
            here.map(|p| p.join("data").join("gaze")),
            parent.map(|p| p.join("data").join("gaze")),
            Some(conf_gaze_dir.into()),
        ];
        Self { dirs: candidates.into_iter().flatten().collect() }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        self.dirs.iter().map(|dir| dir.join(filename)).find(|p| p.is_file())
    }
}
