use std::fmt;
use std::str::FromStr;

use opencv::core::Rect;
use serde::{Deserialize, Serialize};

/// 嵌入向量的默认维度（CLIP ViT-B/32）
pub const EMBEDDING_DIM: usize = 512;

/// 经过 L2 归一化的嵌入向量
pub type EmbeddingVector = Vec<f32>;

/// 画面的四个象限，以 (W/2, H/2) 为中点划分
///
/// 视线区域（1~4）与象限是同一种划分，因此直接复用该类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [Quadrant::Q1, Quadrant::Q2, Quadrant::Q3, Quadrant::Q4];

    /// 视线区域编号，1~4
    pub fn zone(self) -> i32 {
        self as i32 + 1
    }

    /// 从视线区域编号转换，超出 1~4 的返回 None
    pub fn from_zone(zone: i32) -> Option<Self> {
        match zone {
            1 => Some(Quadrant::Q1),
            2 => Some(Quadrant::Q2),
            3 => Some(Quadrant::Q3),
            4 => Some(Quadrant::Q4),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quadrant::Q1 => "Top-Left",
            Quadrant::Q2 => "Top-Right",
            Quadrant::Q3 => "Bottom-Left",
            Quadrant::Q4 => "Bottom-Right",
        }
    }

    /// 该象限在 width x height 画面中对应的矩形
    pub fn rect(self, width: i32, height: i32) -> BoundingBox {
        let (mx, my) = (width / 2, height / 2);
        match self {
            Quadrant::Q1 => BoundingBox::new(0, 0, mx, my),
            Quadrant::Q2 => BoundingBox::new(mx, 0, width, my),
            Quadrant::Q3 => BoundingBox::new(0, my, mx, height),
            Quadrant::Q4 => BoundingBox::new(mx, my, width, height),
        }
    }

    /// 返回点 (x, y) 所在的象限，边界规则与 [`Quadrant::rect`] 一致
    pub fn of_point(x: i32, y: i32, width: i32, height: i32) -> Self {
        let (mx, my) = (width / 2, height / 2);
        match (x < mx, y < my) {
            (true, true) => Quadrant::Q1,
            (false, true) => Quadrant::Q2,
            (true, false) => Quadrant::Q3,
            (false, false) => Quadrant::Q4,
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.zone())
    }
}

impl FromStr for Quadrant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix(['Q', 'q']).unwrap_or(s);
        digits
            .parse::<i32>()
            .ok()
            .and_then(Quadrant::from_zone)
            .ok_or_else(|| format!("无效的象限: {}", s))
    }
}

/// 像素坐标矩形 (x1, y1, x2, y2)，右下角不包含在内
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// x2 <= x1 或 y2 <= y1
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// 裁剪到 [0, width] x [0, height] 范围内
    pub fn clip(&self, width: i32, height: i32) -> Self {
        Self {
            x1: self.x1.clamp(0, width),
            y1: self.y1.clamp(0, height),
            x2: self.x2.clamp(0, width),
            y2: self.y2.clamp(0, height),
        }
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> i64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        (ix2 - ix1).max(0) as i64 * (iy2 - iy1).max(0) as i64
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl From<Rect> for BoundingBox {
    fn from(r: Rect) -> Self {
        Self::new(r.x, r.y, r.x + r.width, r.y + r.height)
    }
}

impl From<BoundingBox> for Rect {
    fn from(b: BoundingBox) -> Self {
        Rect::new(b.x1, b.y1, b.width(), b.height())
    }
}
