//! 单只眼睛的瞳孔与反光点检测

use std::f64::consts::PI;
use std::ops::Range;

use opencv::core::{self, Mat, Point, Point2f, Rect, Size, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use super::features::EyeKeypoints;
use crate::types::BoundingBox;

/// 瞳孔轮廓面积范围（开区间，像素²）
const PUPIL_AREA: (f64, f64) = (15.0, 400.0);
/// 瞳孔轮廓圆度范围（开区间）
const PUPIL_CIRCULARITY: (f64, f64) = (0.7, 1.2);
/// 反光点最低亮度
const GLINT_MIN_INTENSITY: f64 = 180.0;

/// 从灰度画面中提取一只眼睛的关键点
///
/// `eye` 为该眼睛 6 个关键点在 `landmarks` 中的下标范围。
/// 眼睛区域为空时返回 `Ok(None)`；瞳孔或反光点检测失败时对应字段为 None。
pub fn extract_eye(
    gray: &Mat,
    landmarks: &[Point2f],
    eye: Range<usize>,
) -> opencv::Result<Option<EyeKeypoints>> {
    let Some(points) = landmarks.get(eye) else {
        return Ok(None);
    };
    if points.len() < 4 {
        return Ok(None);
    }
    let points = points
        .iter()
        .map(|p| Point::new(p.x as i32, p.y as i32))
        .collect::<Vector<Point>>();

    let rect = imgproc::bounding_rect(&points)?;
    let region = BoundingBox::from(rect).clip(gray.cols(), gray.rows());
    if region.is_empty() {
        return Ok(None);
    }
    let rect = Rect::from(region);

    let roi = Mat::roi(gray, rect)?;
    let mut enhanced = Mat::default();
    let mut clahe = imgproc::create_clahe(2.0, Size::new(8, 8))?;
    clahe.apply(&roi, &mut enhanced)?;

    let offset = rect.tl();
    Ok(Some(EyeKeypoints {
        inner_corner: points.get(3)?,
        outer_corner: points.get(0)?,
        pupil: find_pupil(&enhanced)?.map(|p| p + offset),
        glint: find_glint(&enhanced)?.map(|p| p + offset),
    }))
}

/// 二值化后寻找最接近圆形的轮廓，返回其质心（眼睛区域内的坐标）
fn find_pupil(eye: &Mat) -> opencv::Result<Option<Point>> {
    let mut binary = Mat::default();
    imgproc::adaptive_threshold(
        eye,
        &mut binary,
        255.0,
        imgproc::ADAPTIVE_THRESH_GAUSSIAN_C,
        imgproc::THRESH_BINARY_INV,
        11,
        2.0,
    )?;

    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours(
        &binary,
        &mut contours,
        imgproc::RETR_TREE,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::default(),
    )?;

    let mut best: Option<(f64, Vector<Point>)> = None;
    for contour in contours {
        let area = imgproc::contour_area(&contour, false)?;
        let perimeter = imgproc::arc_length(&contour, true)?;
        if area == 0.0 || perimeter == 0.0 {
            continue;
        }
        let circularity = 4.0 * PI * area / (perimeter * perimeter);
        let in_range = |v: f64, (lo, hi): (f64, f64)| lo < v && v < hi;
        if in_range(circularity, PUPIL_CIRCULARITY)
            && in_range(area, PUPIL_AREA)
            && circularity > best.as_ref().map_or(0.0, |(c, _)| *c)
        {
            best = Some((circularity, contour));
        }
    }

    let Some((_, contour)) = best else {
        return Ok(None);
    };
    let m = imgproc::moments(&contour, false)?;
    if m.m00 == 0.0 {
        return Ok(None);
    }
    Ok(Some(Point::new((m.m10 / m.m00) as i32, (m.m01 / m.m00) as i32)))
}

/// 眼睛区域内最亮的点，亮度不足时视为没有反光
fn find_glint(eye: &Mat) -> opencv::Result<Option<Point>> {
    let mut max_val = 0.0;
    let mut max_loc = Point::default();
    core::min_max_loc(eye, None, Some(&mut max_val), None, Some(&mut max_loc), &core::no_array())?;
    Ok((max_val > GLINT_MIN_INTENSITY).then_some(max_loc))
}
