//! 作品目录
//!
//! `catalogue.json` 中的条目顺序与向量索引中的位置一一对应。

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::quadrant::{QuadrantRatios, primary_quadrant, quadrants_for_bbox};
use crate::types::{BoundingBox, Quadrant};

/// 作品的一个子区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecord {
    pub crop_id: String,
    /// 在作品原图中的位置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub quadrant_ratios: QuadrantRatios,
    /// 比例最大的象限，加载时如果缺失会重新计算
    #[serde(default)]
    pub primary_quadrant: Option<Quadrant>,
    #[serde(alias = "crop_description")]
    pub description: String,
}

impl CropRecord {
    pub fn new(
        crop_id: impl Into<String>,
        bbox: Option<BoundingBox>,
        quadrant_ratios: QuadrantRatios,
        description: impl Into<String>,
    ) -> Self {
        let primary_quadrant = primary_quadrant(&quadrant_ratios);
        Self {
            crop_id: crop_id.into(),
            bbox,
            quadrant_ratios,
            primary_quadrant,
            description: description.into(),
        }
    }

    /// 根据边界框在 width x height 原图中的位置创建，裁剪后为空则返回 None
    pub fn from_bbox(
        crop_id: impl Into<String>,
        bbox: BoundingBox,
        width: i32,
        height: i32,
        description: impl Into<String>,
    ) -> Option<Self> {
        let (_, ratios) = quadrants_for_bbox(bbox, width, height, 0.0, 1);
        if ratios.is_empty() {
            return None;
        }
        Some(Self::new(crop_id, Some(bbox.clip(width, height)), ratios, description))
    }

    /// 与指定象限的重叠比例，缺失视为 0
    pub fn ratio(&self, quadrant: Quadrant) -> f64 {
        self.quadrant_ratios.get(&quadrant).copied().unwrap_or(0.0)
    }
}

/// 一件作品的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEntry")]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub summary: String,
    pub image_path: String,
    pub crops: Vec<CropRecord>,
}

/// 作品 ID 在不同的数据来源中可能是数字也可能是字符串
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Str(String),
}

impl From<RawId> for String {
    fn from(id: RawId) -> Self {
        match id {
            RawId::Int(i) => i.to_string(),
            RawId::Str(s) => s,
        }
    }
}

/// 磁盘上的条目，同一条记录里可能同时出现多个 ID 字段
#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "objectID", alias = "objectId")]
    object_id: Option<RawId>,
    id: Option<RawId>,
    full_image_id: Option<RawId>,
    #[serde(default, alias = "full_image_title")]
    title: String,
    #[serde(default, alias = "full_image_artist")]
    artist: String,
    #[serde(default, alias = "full_image_description")]
    summary: String,
    #[serde(default)]
    image_path: String,
    #[serde(default)]
    crops: Vec<CropRecord>,
}

impl TryFrom<RawEntry> for IndexEntry {
    type Error = String;

    /// ID 优先级：objectID > id > full_image_id
    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        let id = raw
            .object_id
            .or(raw.id)
            .or(raw.full_image_id)
            .ok_or("entry has no objectID, id or full_image_id")?;
        Ok(Self {
            id: id.into(),
            title: raw.title,
            artist: raw.artist,
            summary: raw.summary,
            image_path: raw.image_path,
            crops: raw.crops,
        })
    }
}

/// 进程生命周期内只读的作品目录
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    entries: Vec<IndexEntry>,
}

impl Catalogue {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        let mut s = Self { entries };
        s.fill_primary_quadrants();
        s
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open catalogue {}", path.display()))?;
        let entries: Vec<IndexEntry> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse catalogue {}", path.display()))?;
        debug!("loaded {} catalogue entries from {}", entries.len(), path.display());
        Ok(Self::new(entries))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.entries)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按索引位置获取条目
    pub fn get(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.entries
    }

    /// 检查目录长度是否与索引大小一致，不一致时只打印警告
    pub fn check_alignment(&self, index_len: usize) -> bool {
        if self.entries.len() != index_len {
            warn!(
                "catalogue length ({}) != index size ({}), results may map to wrong artworks",
                self.entries.len(),
                index_len
            );
            return false;
        }
        true
    }

    fn fill_primary_quadrants(&mut self) {
        for crop in self.entries.iter_mut().flat_map(|e| e.crops.iter_mut()) {
            if crop.primary_quadrant.is_none() {
                crop.primary_quadrant = primary_quadrant(&crop.quadrant_ratios);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_legacy_fields() {
        let json = r#"[{
            "full_image_id": 436244,
            "full_image_title": "Wheat Field with Cypresses",
            "full_image_artist": "Vincent van Gogh",
            "crops": [{
                "crop_id": "436244_crop0",
                "quadrant_ratios": {"Q1": 0.2, "Q2": 0.8, "Q3": 0.0, "Q4": 0.0},
                "crop_description": "cypress trees"
            }]
        }]"#;
        let entries: Vec<IndexEntry> = serde_json::from_str(json).unwrap();
        let catalogue = Catalogue::new(entries);
        let entry = catalogue.get(0).unwrap();
        assert_eq!(entry.id, "436244");
        assert_eq!(entry.artist, "Vincent van Gogh");
        assert_eq!(entry.crops[0].description, "cypress trees");
        assert_eq!(entry.crops[0].primary_quadrant, Some(Quadrant::Q2));
        assert!(catalogue.get(1).is_none());
    }

    #[test]
    fn text_meta_with_both_ids() {
        let json = r#"[{
            "id": "1",
            "objectID": 436535,
            "title": "Wheat Field with Cypresses",
            "artist": "Vincent van Gogh",
            "summary": "cypresses under a swirling sky",
            "image_path": "images/436535.jpg"
        }]"#;
        let entries: Vec<IndexEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].id, "436535");
        assert_eq!(entries[0].summary, "cypresses under a swirling sky");
        assert!(entries[0].crops.is_empty());
    }

    #[test]
    fn id_priority() {
        let pick = |json: &str| serde_json::from_str::<IndexEntry>(json).map(|e| e.id);
        assert_eq!(pick(r#"{"objectId": 7, "full_image_id": 8}"#).unwrap(), "7");
        assert_eq!(pick(r#"{"id": "a", "full_image_id": 8}"#).unwrap(), "a");
        assert_eq!(pick(r#"{"full_image_id": 8}"#).unwrap(), "8");
        assert!(pick(r#"{"title": "untitled"}"#).is_err());
    }

    #[test]
    fn structured_description_is_summary() {
        let json = r#"{
            "full_image_id": 437984,
            "full_image_description": "a vase of sunflowers",
            "image_path": "images/437984.jpg",
            "crops": []
        }"#;
        let entry: IndexEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.summary, "a vase of sunflowers");
        assert_eq!(entry.image_path, "images/437984.jpg");
    }

    #[test]
    fn saved_catalogue_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalogue.json");
        let json = r#"[{"objectID": 436535, "id": "1", "title": "Wheat Field"}]"#;
        let entries: Vec<IndexEntry> = serde_json::from_str(json).unwrap();
        Catalogue::new(entries).save(&path).unwrap();

        let reopened = Catalogue::open(&path).unwrap();
        assert_eq!(reopened.get(0).unwrap().id, "436535");
        assert_eq!(reopened.get(0).unwrap().title, "Wheat Field");
    }

    #[test]
    fn crop_from_degenerate_bbox() {
        let flat = BoundingBox::new(10, 10, 10, 20);
        assert!(CropRecord::from_bbox("c", flat, 100, 100, "").is_none());
        let outside = BoundingBox::new(60, 60, 200, 200);
        let crop = CropRecord::from_bbox("c", outside, 100, 100, "x").unwrap();
        assert_eq!(crop.bbox, Some(BoundingBox::new(60, 60, 100, 100)));
        assert_eq!(crop.primary_quadrant, Some(Quadrant::Q4));
        assert_eq!(crop.ratio(Quadrant::Q4), 1.0);
    }

    #[test]
    fn alignment() {
        let catalogue = Catalogue::default();
        assert!(catalogue.check_alignment(0));
        assert!(!catalogue.check_alignment(3));
    }
}
