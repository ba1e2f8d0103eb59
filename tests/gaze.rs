use std::fs;
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use anyhow::{Result, bail};
use log::{Level, LevelFilter, Log, Metadata, Record};
use opencv::core::{CV_8UC1, CV_8UC3, Mat, Point, Point2f, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;
use rstest::*;

use docent::GazeError;
use docent::Quadrant;
use docent::gaze::*;
use docent::utils::to_gray;

/// 按线程记录警告日志，测试并行运行时互不干扰
struct WarnCapture(Mutex<Vec<(ThreadId, String)>>);

static WARNINGS: WarnCapture = WarnCapture(Mutex::new(Vec::new()));

impl Log for WarnCapture {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let msg = record.args().to_string();
            self.0.lock().unwrap().push((thread::current().id(), msg));
        }
    }

    fn flush(&self) {}
}

/// 当前线程收到的警告
fn warnings() -> Vec<String> {
    let _ = log::set_logger(&WARNINGS).map(|()| log::set_max_level(LevelFilter::Warn));
    let id = thread::current().id();
    let logs = WARNINGS.0.lock().unwrap();
    logs.iter().filter(|(t, _)| *t == id).map(|(_, m)| m.clone()).collect()
}

/// 返回固定人脸和关键点
struct FixedLandmarker {
    faces: Vec<Rect>,
    marks: Vec<Point2f>,
}

impl FaceLandmarker for FixedLandmarker {
    fn faces(&mut self, _gray: &Mat) -> Result<Vec<Rect>> {
        Ok(self.faces.clone())
    }

    fn landmarks(&mut self, _gray: &Mat, _face: Rect) -> Result<Vec<Point2f>> {
        Ok(self.marks.clone())
    }
}

struct FixedZone(Option<i32>);

impl ZoneModel for FixedZone {
    fn predict(&self, _features: &EyeFeatures) -> Result<i32> {
        match self.0 {
            Some(zone) => Ok(zone),
            None => bail!("model exploded"),
        }
    }
}

/// 左眼区域 (10, 40) - (50, 64)，右眼区域 (60, 40) - (100, 64)
fn face_landmarks() -> Vec<Point2f> {
    let mut marks = vec![Point2f::new(50., 80.); 68];
    let outline = [(0., 12.), (12., 0.), (28., 0.), (40., 12.), (28., 24.), (12., 24.)];
    for (eye, x) in [(LEFT_EYE, 10.), (RIGHT_EYE, 60.)] {
        for (i, (dx, dy)) in outline.iter().enumerate() {
            marks[eye.start + i] = Point2f::new(x + dx, 40. + dy);
        }
    }
    marks
}

fn models(faces: Vec<Rect>, zone: Option<i32>) -> GazeModels {
    GazeModels::new(
        Box::new(FixedLandmarker { faces, marks: face_landmarks() }),
        Box::new(FixedZone(zone)),
    )
}

#[fixture]
fn frame() -> Mat {
    Mat::new_rows_cols_with_default(120, 120, CV_8UC3, Scalar::all(90.)).unwrap()
}

/// 白色背景上两个黑色圆形瞳孔，分别位于两只眼睛区域的中心
#[fixture]
fn looking_face() -> Mat {
    let mut frame =
        Mat::new_rows_cols_with_default(120, 120, CV_8UC3, Scalar::all(255.)).unwrap();
    for center in [Point::new(30, 52), Point::new(80, 52)] {
        imgproc::circle(&mut frame, center, 6, Scalar::all(0.), imgproc::FILLED, imgproc::LINE_8, 0)
            .unwrap();
    }
    frame
}

#[rstest]
fn missing_artifacts_disable_classifier(frame: Mat) {
    let dir = assert_fs::TempDir::new().unwrap();
    let locator = ArtifactLocator::new(vec![dir.path().to_path_buf()]);
    let mut clf = GazeZoneClassifier::new(locator, GazeArtifacts::default());
    assert!(matches!(clf.state(), ClassifierState::Uninitialized));

    assert_eq!(clf.classify(&frame), None);
    assert!(clf.is_disabled());

    // 禁用后不会再尝试加载
    let artifacts = GazeArtifacts::default();
    for name in [&artifacts.face_cascade, &artifacts.landmark_model, &artifacts.zone_model] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    assert_eq!(clf.classify(&frame), None);
    assert!(clf.is_disabled());
}

#[rstest]
fn disabled_warning_logged_once(frame: Mat) {
    let before = warnings().len();
    let dir = assert_fs::TempDir::new().unwrap();
    let locator = ArtifactLocator::new(vec![dir.path().to_path_buf()]);
    let mut clf = GazeZoneClassifier::new(locator, GazeArtifacts::default());

    assert_eq!(clf.classify(&frame), None);
    assert_eq!(clf.classify(&frame), None);
    let logged = warnings();
    let disabled = logged[before..].iter().filter(|m| m.contains("视线分类已禁用")).count();
    assert_eq!(disabled, 1, "warnings: {:?}", &logged[before..]);
}

#[test]
fn missing_artifact_is_named() {
    let dir = assert_fs::TempDir::new().unwrap();
    let artifacts = GazeArtifacts::default();
    fs::write(dir.path().join(&artifacts.face_cascade), "").unwrap();

    let locator = ArtifactLocator::new(vec![dir.path().to_path_buf()]);
    match GazeModels::load(&locator, &artifacts) {
        Err(GazeError::DegradedClassifier(msg)) => assert!(msg.contains("lbfmodel.yaml")),
        Err(e) => panic!("unexpected error {e:?}"),
        Ok(_) => panic!("models should not load"),
    }
}

#[test]
fn broken_artifacts_degrade() {
    let dir = assert_fs::TempDir::new().unwrap();
    let artifacts = GazeArtifacts::default();
    for name in [&artifacts.face_cascade, &artifacts.landmark_model, &artifacts.zone_model] {
        fs::write(dir.path().join(name), "not a model").unwrap();
    }
    let locator = ArtifactLocator::new(vec![dir.path().to_path_buf()]);
    assert!(matches!(
        GazeModels::load(&locator, &artifacts),
        Err(GazeError::DegradedClassifier(_))
    ));
}

#[rstest]
fn no_face_is_unknown(frame: Mat) {
    let mut clf = GazeZoneClassifier::with_models(models(vec![], Some(1)));
    assert!(matches!(clf.try_classify(&frame), Err(GazeError::NoFaceDetected)));
    assert_eq!(clf.classify(&frame), None);
    assert!(!clf.is_disabled());
}

#[rstest]
fn featureless_eyes_are_unknown(frame: Mat) {
    let face = vec![Rect::new(0, 0, 120, 120)];
    let mut clf = GazeZoneClassifier::with_models(models(face, Some(1)));
    assert!(matches!(clf.try_classify(&frame), Err(GazeError::IncompleteEyeFeatures)));
    assert_eq!(clf.classify(&frame), None);
}

#[rstest]
fn pupils_and_glints_found(looking_face: Mat) {
    let gray = to_gray(&looking_face).unwrap();
    let marks = face_landmarks();
    for (eye, center, corner) in [
        (LEFT_EYE, Point::new(30, 52), Point::new(10, 40)),
        (RIGHT_EYE, Point::new(80, 52), Point::new(60, 40)),
    ] {
        let keypoints = extract_eye(&gray, &marks, eye).unwrap().unwrap();
        let pupil = keypoints.pupil.expect("pupil should be found");
        assert!((pupil.x - center.x).abs() <= 2 && (pupil.y - center.y).abs() <= 2, "{pupil:?}");
        assert_eq!(keypoints.glint, Some(corner));
    }
}

#[rstest]
fn visible_eyes_are_classified(looking_face: Mat) {
    let face = vec![Rect::new(0, 0, 120, 120)];
    let mut clf = GazeZoneClassifier::with_models(models(face, Some(3)));
    assert_eq!(clf.try_classify(&looking_face).unwrap(), Quadrant::Q3);
    assert_eq!(clf.classify(&looking_face), Some(Quadrant::Q3));

    // 同一帧的特征是确定的
    let mut landmarker =
        FixedLandmarker { faces: vec![Rect::new(0, 0, 120, 120)], marks: face_landmarks() };
    let a = extract_features(&mut landmarker, &looking_face).unwrap();
    let b = extract_features(&mut landmarker, &to_gray(&looking_face).unwrap()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn extract_features_accepts_gray_frames() {
    let gray = Mat::new_rows_cols_with_default(120, 120, CV_8UC1, Scalar::all(90.)).unwrap();
    let mut landmarker =
        FixedLandmarker { faces: vec![Rect::new(0, 0, 120, 120)], marks: face_landmarks() };
    assert!(matches!(
        extract_features(&mut landmarker, &gray),
        Err(GazeError::IncompleteEyeFeatures)
    ));
}

#[rstest]
#[case(1, Quadrant::Q1)]
#[case(2, Quadrant::Q2)]
#[case(3, Quadrant::Q3)]
#[case(4, Quadrant::Q4)]
fn zone_maps_to_quadrant(#[case] zone: i32, #[case] expected: Quadrant) {
    let m = models(vec![], Some(zone));
    let features = EyeFeatures::from_array([0.0; FEATURE_LEN]);
    assert_eq!(m.zone_of(&features).unwrap(), expected);
}

#[rstest]
#[case(0)]
#[case(5)]
#[case(-1)]
fn invalid_zone(#[case] zone: i32) {
    let m = models(vec![], Some(zone));
    let features = EyeFeatures::from_array([0.0; FEATURE_LEN]);
    assert!(matches!(m.zone_of(&features), Err(GazeError::InvalidZone(z)) if z == zone));
}

#[test]
fn model_failure_is_reported() {
    let m = models(vec![], None);
    let features = EyeFeatures::from_array([0.0; FEATURE_LEN]);
    assert!(matches!(m.zone_of(&features), Err(GazeError::Model(_))));
}
