use std::ops::Index;

use opencv::core::Point;

/// 单只眼睛的关键点，坐标为整幅画面中的像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeKeypoints {
    /// 内眼角（靠近鼻梁）
    pub inner_corner: Point,
    /// 外眼角
    pub outer_corner: Point,
    /// 瞳孔中心，检测失败为 None
    pub pupil: Option<Point>,
    /// 角膜反光点，检测失败为 None
    pub glint: Option<Point>,
}

impl EyeKeypoints {
    /// 特征计算需要的三个点：(内眼角, 瞳孔, 反光点)
    fn anchors(&self) -> Option<([f64; 2], [f64; 2], [f64; 2])> {
        Some((to_vec(self.inner_corner), to_vec(self.pupil?), to_vec(self.glint?)))
    }
}

/// 特征维度
pub const FEATURE_LEN: usize = 22;

/// 由左右眼关键点计算出的几何特征
///
/// 训练与推理必须使用相同的顺序：
///
/// | 下标   | 含义                               |
/// |--------|------------------------------------|
/// | 0..3   | 左眼 瞳孔-反光 向量 (x, y, 长度)   |
/// | 3..6   | 右眼 瞳孔-反光 向量 (x, y, 长度)   |
/// | 6..9   | 左眼 瞳孔-内眼角 向量 (x, y, 长度) |
/// | 9..12  | 右眼 瞳孔-内眼角 向量 (x, y, 长度) |
/// | 12..15 | 左眼 反光-内眼角 向量 (x, y, 长度) |
/// | 15..18 | 右眼 反光-内眼角 向量 (x, y, 长度) |
/// | 18     | 两内眼角距离                       |
/// | 19     | 左眼 瞳孔-反光 与 反光-内眼角 夹角 |
/// | 20     | 右眼 瞳孔-反光 与 反光-内眼角 夹角 |
/// | 21     | 左内眼角 - 右内眼角 向量的方向角   |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeFeatures([f32; FEATURE_LEN]);

impl EyeFeatures {
    /// 任意一只眼睛缺少瞳孔或反光点时返回 None
    pub fn from_keypoints(left: &EyeKeypoints, right: &EyeKeypoints) -> Option<Self> {
        let (l_inner, l_pupil, l_glint) = left.anchors()?;
        let (r_inner, r_pupil, r_glint) = right.anchors()?;

        let vl_pg = sub(l_pupil, l_glint);
        let vr_pg = sub(r_pupil, r_glint);
        let vl_pc = sub(l_pupil, l_inner);
        let vr_pc = sub(r_pupil, r_inner);
        let vl_gc = sub(l_glint, l_inner);
        let vr_gc = sub(r_glint, r_inner);
        let vcc = sub(l_inner, r_inner);

        let mut feats = [0f32; FEATURE_LEN];
        for (i, v) in [vl_pg, vr_pg, vl_pc, vr_pc, vl_gc, vr_gc].into_iter().enumerate() {
            feats[i * 3] = v[0] as f32;
            feats[i * 3 + 1] = v[1] as f32;
            feats[i * 3 + 2] = norm(v) as f32;
        }
        feats[18] = norm(vcc) as f32;
        feats[19] = angle(vl_pg, vl_gc) as f32;
        feats[20] = angle(vr_pg, vr_gc) as f32;
        feats[21] = vcc[1].atan2(vcc[0]) as f32;

        Some(Self(feats))
    }

    pub fn from_array(values: [f32; FEATURE_LEN]) -> Self {
        Self(values)
    }

    pub fn to_array(&self) -> [f32; FEATURE_LEN] {
        self.0
    }
}

impl Index<usize> for EyeFeatures {
    type Output = f32;

    fn index(&self, i: usize) -> &f32 {
        &self.0[i]
    }
}

fn to_vec(p: Point) -> [f64; 2] {
    [p.x as f64, p.y as f64]
}

fn sub(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

fn norm(v: [f64; 2]) -> f64 {
    v[0].hypot(v[1])
}

/// 两个向量的夹角，分母加上 1e-6 避免除零
fn angle(a: [f64; 2], b: [f64; 2]) -> f64 {
    let cos = (a[0] * b[0] + a[1] * b[1]) / (norm(a) * norm(b) + 1e-6);
    cos.clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use super::*;

    type Xy = (i32, i32);

    fn eye(inner: Xy, pupil: Option<Xy>, glint: Option<Xy>) -> EyeKeypoints {
        EyeKeypoints {
            inner_corner: Point::new(inner.0, inner.1),
            outer_corner: Point::new(inner.0 - 30, inner.1),
            pupil: pupil.map(|(x, y)| Point::new(x, y)),
            glint: glint.map(|(x, y)| Point::new(x, y)),
        }
    }

    #[test]
    fn missing_glint() {
        let left = eye((100, 50), Some((85, 50)), None);
        let right = eye((140, 50), Some((155, 50)), Some((157, 52)));
        assert!(EyeFeatures::from_keypoints(&left, &right).is_none());
        assert!(EyeFeatures::from_keypoints(&right, &left).is_none());
    }

    #[test]
    fn layout() {
        let left = eye((100, 50), Some((85, 50)), Some((88, 54)));
        let right = eye((140, 50), Some((155, 50)), Some((155, 53)));
        let f = EyeFeatures::from_keypoints(&left, &right).unwrap();

        // 左眼 瞳孔-反光 = (-3, -4)
        assert_eq!((f[0], f[1], f[2]), (-3.0, -4.0, 5.0));
        // 右眼 瞳孔-反光 = (0, -3)
        assert_eq!((f[3], f[4], f[5]), (0.0, -3.0, 3.0));
        // 左眼 瞳孔-内眼角 = (-15, 0)
        assert_eq!((f[6], f[7], f[8]), (-15.0, 0.0, 15.0));
        // 右眼 反光-内眼角 = (15, 3)
        assert_eq!((f[15], f[16]), (15.0, 3.0));
        assert_eq!(f[18], 40.0);
        // 右眼 (0,-3) 与 (15,3) 的夹角
        let expected = ((-9.0f64) / (3.0 * 234f64.sqrt() + 1e-6)).acos() as f32;
        assert!((f[20] - expected).abs() < 1e-5);
        // 左内眼角在右内眼角的左侧
        assert!((f[21] - PI).abs() < 1e-6);
    }

    #[test]
    fn angle_is_clipped_and_safe() {
        assert!((angle([1.0, 0.0], [0.0, 2.0]) as f32 - FRAC_PI_2).abs() < 1e-6);
        assert_eq!(angle([1.0, 0.0], [1.0, 0.0]), (1.0f64 / (1.0 + 1e-6)).acos());
        // 零向量不会产生 NaN
        assert_eq!(angle([0.0, 0.0], [1.0, 0.0]), FRAC_PI_2 as f64);
    }
}
