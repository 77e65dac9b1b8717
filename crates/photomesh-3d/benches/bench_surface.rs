use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{DMat3, DVec2, DVec3};
use photomesh_3d::{
    camera::CameraIntrinsics,
    deadline::Deadline,
    pointcloud::PointCloud,
    pose::{EssentialRansac, RansacParams, RobustPoseSolver},
    surface::{PoissonConfig, PoissonReconstructor, SurfaceFitter},
};

/// Points on a sphere with outward normals.
fn sphere_cloud(n: usize) -> PointCloud {
    let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    let mut points = Vec::with_capacity(n);
    let mut normals = Vec::with_capacity(n);
    for i in 0..n {
        let y = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
        let r = (1.0 - y * y).sqrt();
        let theta = golden * i as f64;
        let dir = DVec3::new(r * theta.cos(), y, r * theta.sin());
        points.push(dir.to_array());
        normals.push(dir.to_array());
    }
    PointCloud::new(points, None, Some(normals)).unwrap()
}

/// Pixel correspondences of a random-ish point cloud seen from two cameras.
fn two_view_data(n: usize, k: &CameraIntrinsics) -> (Vec<DVec2>, Vec<DVec2>) {
    let rotation = DMat3::from_rotation_y(0.1);
    let translation = DVec3::new(-1.0, 0.05, 0.0);
    let mut x1 = Vec::with_capacity(n);
    let mut x2 = Vec::with_capacity(n);
    for i in 0..n {
        let f = i as f64;
        let p = DVec3::new(
            (f * 0.37).sin() * 2.0,
            (f * 0.53).cos() * 1.5,
            5.0 + (f * 0.71).sin(),
        );
        let q = rotation * p + translation;
        x1.push(k.project(p).unwrap());
        x2.push(k.project(q).unwrap());
    }
    (x1, x2)
}

fn bench_pose(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pose");
    let k = CameraIntrinsics::new(500.0, 320.0, 240.0);

    for n in [50, 200] {
        let (x1, x2) = two_view_data(n, &k);
        let solver = EssentialRansac::new(RansacParams {
            max_iterations: 200,
            ..Default::default()
        });
        group.bench_with_input(BenchmarkId::new("essential_ransac", n), &n, |b, _| {
            b.iter(|| std::hint::black_box(solver.estimate(&x1, &x2, &k)))
        });
    }
    group.finish();
}

fn bench_poisson(c: &mut Criterion) {
    let mut group = c.benchmark_group("Poisson");
    group.sample_size(10);

    for depth in [5, 6] {
        let cloud = sphere_cloud(2000);
        let reconstructor = PoissonReconstructor::new(PoissonConfig::default().with_depth(depth));
        group.bench_with_input(BenchmarkId::new("sphere", depth), &cloud, |b, c| {
            b.iter(|| std::hint::black_box(reconstructor.fit(c, &Deadline::never())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pose, bench_poisson);
criterion_main!(benches);
