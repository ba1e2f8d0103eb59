use std::sync::LazyLock;
use std::time::Duration;

use log::error;
use prometheus::*;

use crate::error::{AttentionError, GazeError};
use crate::types::Quadrant;

static METRIC_RESOLVE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "docent_resolve_count",
        "count of attention resolutions by outcome",
        &["outcome"]
    )
    .unwrap()
});

static METRIC_GAZE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "docent_gaze_count",
        "count of gaze classifications by outcome",
        &["outcome"]
    )
    .unwrap()
});

static METRIC_RESOLVE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "docent_resolve_duration",
        "duration of the per-trigger resolution in seconds"
    )
    .unwrap()
});

static METRIC_MATCH_SCORE: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "docent_match_score",
        "top-1 inner product score of the artwork search",
        (-10..=10).map(|x| x as f64 / 10.).collect()
    )
    .unwrap()
});

pub fn inc_resolve_outcome<T>(result: &std::result::Result<T, AttentionError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(AttentionError::NoObjectDetected) => "no_object",
        Err(AttentionError::NoMatch { .. }) => "no_match",
        Err(e) if e.is_not_found() => "not_found",
        Err(_) => "error",
    };
    METRIC_RESOLVE_COUNT.with_label_values(&[outcome]).inc();
}

pub fn inc_gaze_outcome(result: &std::result::Result<Quadrant, GazeError>) {
    let outcome = match result {
        Ok(q) => match q {
            Quadrant::Q1 => "q1",
            Quadrant::Q2 => "q2",
            Quadrant::Q3 => "q3",
            Quadrant::Q4 => "q4",
        },
        Err(GazeError::DegradedClassifier(_)) => "disabled",
        Err(GazeError::NoFaceDetected) => "no_face",
        Err(GazeError::IncompleteEyeFeatures) => "incomplete",
        Err(_) => "error",
    };
    METRIC_GAZE_COUNT.with_label_values(&[outcome]).inc();
}

pub fn observe_resolve_duration(duration: Duration) {
    METRIC_RESOLVE_DURATION.observe(duration.as_secs_f64());
}

pub fn observe_match_score(score: f32) {
    METRIC_MATCH_SCORE.observe(score as f64);
}

/// 推送一次当前进程的所有指标
///
/// `auth` 格式为 username:password
pub fn push(url: &str, instance: &str, auth: Option<&str>) {
    let metric_families = gather();
    let auth = auth.and_then(|s| s.split_once(':')).map(|(username, password)| {
        BasicAuthentication { username: username.to_string(), password: password.to_string() }
    });
    let r = push_metrics(
        "docent",
        labels! { "instance".to_string() => instance.to_string() },
        url,
        metric_families,
        auth,
    );
    if let Err(e) = r {
        error!("推送指标失败: {e}");
    }
}
