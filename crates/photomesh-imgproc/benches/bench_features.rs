use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use photomesh_image::Image;
use photomesh_imgproc::features::{
    fast_feature_detector, match_ratio_test, orb::BruteForceMatcher, orb::OrbDetector,
    FeatureDetector, RatioTestConfig,
};

fn block_texture(width: usize, height: usize, seed: usize) -> Image<f32, 1> {
    let data = (0..width * height)
        .map(|i| {
            let (bx, by) = ((i % width) / 6, (i / width) / 6);
            ((bx * 7919 + by * 104729 + seed * 13) % 251) as f32
        })
        .collect();
    Image::new([width, height].into(), data).unwrap()
}

fn bench_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("Features");

    for (width, height) in [(320, 240), (640, 480)] {
        let img = block_texture(width, height, 0);
        let parameter_string = format!("{width}x{height}");

        group.bench_with_input(
            BenchmarkId::new("fast_nms", &parameter_string),
            &img,
            |b, i| b.iter(|| black_box(fast_feature_detector(i, 20.0, 9, 3, true))),
        );

        let orb = OrbDetector::default();
        group.bench_with_input(
            BenchmarkId::new("orb_detect_and_compute", &parameter_string),
            &img,
            |b, i| b.iter(|| black_box(orb.detect_and_compute(i)).unwrap()),
        );

        let (_, descs) = orb.detect_and_compute(&img).unwrap();
        let config = RatioTestConfig {
            min_matches: 0,
            ..Default::default()
        };
        group.bench_with_input(
            BenchmarkId::new("brute_force_ratio", &parameter_string),
            &descs,
            |b, d| b.iter(|| black_box(match_ratio_test(&BruteForceMatcher, d, d, &config))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_features);
criterion_main!(benches);
