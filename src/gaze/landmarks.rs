use std::path::Path;

use anyhow::{Result, bail};
use opencv::core::{Mat, Point2f, Ptr, Rect, Size, Vector};
use opencv::face;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

/// 人脸检测 + 68 点关键点定位
pub trait FaceLandmarker {
    /// 在灰度图中检测人脸
    fn faces(&mut self, gray: &Mat) -> Result<Vec<Rect>>;

    /// 返回指定人脸的 68 个关键点，失败时返回空列表
    fn landmarks(&mut self, gray: &Mat, face: Rect) -> Result<Vec<Point2f>>;
}

/// Haar 级联人脸检测 + LBF 关键点模型
pub struct OpenCvLandmarker {
    cascade: CascadeClassifier,
    facemark: Ptr<face::Facemark>,
}

impl OpenCvLandmarker {
    pub fn load(cascade: impl AsRef<Path>, model: impl AsRef<Path>) -> Result<Self> {
        let (cascade, model) = (cascade.as_ref(), model.as_ref());

        let cascade_clf = CascadeClassifier::new(&cascade.to_string_lossy())?;
        if cascade_clf.empty()? {
            bail!("failed to load face cascade {}", cascade.display());
        }

        let mut facemark = face::create_facemark_lbf()?;
        facemark.load_model(&model.to_string_lossy())?;

        Ok(Self { cascade: cascade_clf, facemark })
    }
}

impl FaceLandmarker for OpenCvLandmarker {
    fn faces(&mut self, gray: &Mat) -> Result<Vec<Rect>> {
        let mut faces = Vector::<Rect>::new();
        self.cascade.detect_multi_scale(
            gray,
            &mut faces,
            1.1,
            3,
            0,
            Size::new(30, 30),
            Size::new(0, 0),
        )?;
        Ok(faces.to_vec())
    }

    fn landmarks(&mut self, gray: &Mat, face: Rect) -> Result<Vec<Point2f>> {
        let faces = Vector::<Rect>::from_iter([face]);
        let mut shapes = Vector::<Vector<Point2f>>::new();
        if !self.facemark.fit(gray, &faces, &mut shapes)? || shapes.is_empty() {
            return Ok(vec![]);
        }
        Ok(shapes.get(0)?.to_vec())
    }
}
