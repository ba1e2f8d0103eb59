//! 象限重叠计算
//!
//! 给定一个边界框和画面尺寸，计算边界框与四个象限的重叠比例，
//! 并据此对作品的子区域（crop）进行排序。

use std::collections::BTreeMap;

use crate::catalogue::CropRecord;
use crate::types::{BoundingBox, Quadrant};

/// 象限 -> 重叠比例，比例为 交集面积 / 边界框面积
pub type QuadrantRatios = BTreeMap<Quadrant, f64>;

/// 计算边界框覆盖的象限
///
/// 返回 `(命中列表, 比例表)`：
/// * 命中条件为 交集面积 >= `min_pixels` 且 比例 >= `min_ratio`
/// * 命中列表按比例降序排列，比例相同时保持 Q1 < Q2 < Q3 < Q4 的顺序
/// * 比例表总是包含全部四个象限；裁剪后为空的边界框返回 `([], {})`
pub fn quadrants_for_bbox(
    bbox: BoundingBox,
    width: i32,
    height: i32,
    min_ratio: f64,
    min_pixels: i64,
) -> (Vec<Quadrant>, QuadrantRatios) {
    let bbox = bbox.clip(width, height);
    if bbox.is_empty() {
        return (vec![], QuadrantRatios::new());
    }

    let area = bbox.area() as f64;
    let mut ratios = QuadrantRatios::new();
    let mut hits = vec![];
    for q in Quadrant::ALL {
        let intersection = bbox.intersection_area(&q.rect(width, height));
        let ratio = intersection as f64 / area;
        ratios.insert(q, ratio);
        if intersection >= min_pixels && ratio >= min_ratio {
            hits.push(q);
        }
    }
    // sort_by 是稳定排序，相同比例保持象限顺序
    hits.sort_by(|a, b| ratios[b].total_cmp(&ratios[a]));

    (hits, ratios)
}

/// 比例最大的象限，全部为 0 时返回 None
pub fn primary_quadrant(ratios: &QuadrantRatios) -> Option<Quadrant> {
    let mut best: Option<(Quadrant, f64)> = None;
    for (&q, &ratio) in ratios {
        if ratio > best.map_or(0.0, |(_, r)| r) {
            best = Some((q, ratio));
        }
    }
    best.map(|(q, _)| q)
}

/// 筛选与 `target` 象限有重叠的 crop，按重叠比例降序排列后取前 `top_k` 个
///
/// 比例相同时保持输入顺序
pub fn rank_crops(crops: &[CropRecord], target: Quadrant, top_k: usize) -> Vec<&CropRecord> {
    let mut ranked = crops.iter().filter(|c| c.ratio(target) > 0.0).collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.ratio(target).total_cmp(&a.ratio(target)));
    ranked.truncate(top_k);
    ranked
}
