use std::collections::BTreeMap;
use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use docent::quadrant::{quadrants_for_bbox, rank_crops};
use docent::{BoundingBox, CropRecord, Quadrant};
use rand::prelude::*;

fn random_boxes(n: usize, width: i32, height: i32) -> Vec<BoundingBox> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| {
            let x1 = rng.random_range(-width / 4..width);
            let y1 = rng.random_range(-height / 4..height);
            let x2 = x1 + rng.random_range(0..width / 2);
            let y2 = y1 + rng.random_range(0..height / 2);
            BoundingBox::new(x1, y1, x2, y2)
        })
        .collect()
}

fn bench_quadrants(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadrants_for_bbox");
    let boxes = random_boxes(10_000, 1920, 1080);

    group.throughput(Throughput::Elements(boxes.len() as u64));
    group.bench_function("1080p", |b| {
        b.iter(|| {
            boxes
                .iter()
                .map(|&bbox| quadrants_for_bbox(bbox, 1920, 1080, black_box(0.05), 1).0.len())
                .sum::<usize>()
        });
    });
    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_crops");
    let mut rng = StdRng::seed_from_u64(7);

    // 实际作品的裁剪数量在几十个以内，这里放大以观察排序开销
    for n in [16, 256, 4096] {
        let crops = (0..n)
            .map(|i| {
                let mut ratios = Quadrant::ALL.map(|_| rng.random::<f64>());
                let sum = ratios.iter().sum::<f64>();
                ratios.iter_mut().for_each(|r| *r /= sum);
                let ratios = Quadrant::ALL.into_iter().zip(ratios).collect::<BTreeMap<_, _>>();
                CropRecord::new(format!("crop{i}"), None, ratios, "")
            })
            .collect::<Vec<_>>();

        group.bench_function(format!("{n}"), |b| {
            b.iter(|| rank_crops(&crops, black_box(Quadrant::Q3), 5).len());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_quadrants, bench_rank);
criterion_main!(benches);
