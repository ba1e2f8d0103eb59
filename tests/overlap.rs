use std::collections::BTreeMap;

use rstest::*;

use docent::quadrant::{primary_quadrant, quadrants_for_bbox, rank_crops};
use docent::{BoundingBox, CropRecord, Quadrant};

use Quadrant::*;

fn bbox(x1: i32, y1: i32, x2: i32, y2: i32) -> BoundingBox {
    BoundingBox::new(x1, y1, x2, y2)
}

#[rstest]
#[case(bbox(0, 0, 40, 40), 100, 100)]
#[case(bbox(10, 20, 90, 70), 100, 100)]
#[case(bbox(3, 5, 101, 57), 101, 57)]
#[case(bbox(0, 0, 1, 1), 1, 1)]
#[case(bbox(17, 0, 18, 200), 33, 200)]
fn intersections_sum_to_area(#[case] b: BoundingBox, #[case] w: i32, #[case] h: i32) {
    let total = Quadrant::ALL.iter().map(|q| b.intersection_area(&q.rect(w, h))).sum::<i64>();
    assert_eq!(total, b.area());

    let (_, ratios) = quadrants_for_bbox(b, w, h, 0.0, 1);
    assert_eq!(ratios.len(), 4);
    assert!((ratios.values().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn bbox_inside_one_quadrant() {
    let (hits, ratios) = quadrants_for_bbox(bbox(0, 0, 40, 40), 100, 100, 0.05, 1);
    assert_eq!(hits, vec![Q1]);
    assert_eq!(ratios, BTreeMap::from([(Q1, 1.0), (Q2, 0.0), (Q3, 0.0), (Q4, 0.0)]));
    assert_eq!(primary_quadrant(&ratios), Some(Q1));
}

#[test]
fn centered_bbox_splits_evenly() {
    let (hits, ratios) = quadrants_for_bbox(bbox(40, 40, 60, 60), 100, 100, 0.05, 1);
    for q in Quadrant::ALL {
        assert!((ratios[&q] - 0.25).abs() < 1e-9);
    }
    // 比例相同时按象限顺序
    assert_eq!(hits, vec![Q1, Q2, Q3, Q4]);
    assert_eq!(primary_quadrant(&ratios), Some(Q1));
}

#[rstest]
#[case(bbox(50, 10, 50, 90))]
#[case(bbox(60, 10, 40, 90))]
#[case(bbox(10, 70, 90, 20))]
#[case(bbox(120, 0, 200, 50))]
#[case(bbox(-80, -80, -10, -10))]
fn degenerate_bbox(#[case] b: BoundingBox) {
    let (hits, ratios) = quadrants_for_bbox(b, 100, 100, 0.0, 1);
    assert!(hits.is_empty());
    assert!(ratios.is_empty());
}

#[test]
fn threshold_gating() {
    // 0.7 在 Q1，0.3 在 Q2
    let b = bbox(15, 0, 65, 10);
    let (hits, ratios) = quadrants_for_bbox(b, 100, 100, 0.5, 1);
    assert!((ratios[&Q1] - 0.7).abs() < 1e-9);
    assert!((ratios[&Q2] - 0.3).abs() < 1e-9);
    assert_eq!(hits, vec![Q1]);

    let (hits, _) = quadrants_for_bbox(b, 100, 100, 0.0, 1);
    assert_eq!(hits, vec![Q1, Q2]);
}

#[test]
fn hits_sorted_by_ratio() {
    // Q4 0.6，Q2 0.4
    let (hits, _) = quadrants_for_bbox(bbox(60, 30, 90, 80), 100, 100, 0.05, 1);
    assert_eq!(hits, vec![Q4, Q2]);
}

fn crops() -> Vec<CropRecord> {
    let make = |id: &str, q1: f64, q2: f64| {
        let ratios = BTreeMap::from([(Q1, q1), (Q2, q2), (Q3, 0.0), (Q4, 0.0)]);
        CropRecord::new(id, None, ratios, format!("crop {id}"))
    };
    vec![
        make("a", 0.5, 0.5),
        make("b", 0.0, 1.0),
        make("c", 0.9, 0.1),
        make("d", 0.5, 0.5),
        make("e", 0.2, 0.8),
    ]
}

fn ids(ranked: &[&CropRecord]) -> Vec<String> {
    ranked.iter().map(|c| c.crop_id.clone()).collect()
}

#[test]
fn rank_is_stable_and_idempotent() {
    let crops = crops();
    let first = ids(&rank_crops(&crops, Q1, 10));
    let second = ids(&rank_crops(&crops, Q1, 10));
    assert_eq!(first, vec!["c", "a", "d", "e"]);
    assert_eq!(first, second);
}

#[rstest]
#[case(Q2, 2, &["b", "e"])]
#[case(Q2, 10, &["b", "e", "a", "d", "c"])]
#[case(Q3, 5, &[])]
#[case(Q1, 0, &[])]
fn rank_filters_and_truncates(#[case] q: Quadrant, #[case] k: usize, #[case] expected: &[&str]) {
    assert_eq!(ids(&rank_crops(&crops(), q, k)), expected);
}
