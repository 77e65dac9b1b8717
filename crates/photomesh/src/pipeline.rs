use std::path::Path;
use std::time::{Duration, Instant};

use glam::DVec2;
use log::{debug, info};
use photomesh_3d::{
    camera::CameraIntrinsics,
    deadline::Deadline,
    io::{write_mesh, MeshFormat},
    pointcloud::PointCloudError,
    pose::{EssentialRansac, RobustPoseSolver},
    surface::{PoissonReconstructor, SurfaceError, SurfaceFitter},
    triangulation::Triangulator,
};
use photomesh_image::Image;
use photomesh_imgproc::{
    color::gray_from_rgb_u8,
    features::{
        match_ratio_test, orb::BruteForceMatcher, orb::OrbDetector, DescriptorMatcher,
        FeatureDetector, FeatureError, Keypoint,
    },
};
use photomesh_io::functional::read_image_rgb8;

use crate::config::ReconstructionConfig;
use crate::error::ReconstructError;

/// Summary of a successful reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionReport {
    /// Keypoints detected in the first and second image.
    pub keypoints: [usize; 2],
    /// Correspondences accepted by the ratio test.
    pub matches: usize,
    /// Correspondences consistent with the recovered pose.
    pub inliers: usize,
    /// Points in the cloud handed to the surface fit.
    pub points: usize,
    /// Inliers dropped because they triangulate to infinity.
    pub dropped_points: usize,
    /// Vertices of the written mesh.
    pub vertices: usize,
    /// Faces of the written mesh.
    pub faces: usize,
    /// Format of the written file.
    pub format: MeshFormat,
    /// Wall clock time of the invocation.
    pub elapsed: Duration,
}

/// Two-view structure from motion followed by Poisson surface reconstruction.
///
/// The stages run strictly in sequence: feature extraction on both images, ratio test matching,
/// robust relative pose, triangulation of the inliers, point cloud assembly, surface fit and
/// atomic export. Every component is a capability that can be swapped, the defaults being ORB,
/// brute force Hamming matching, five point RANSAC and Poisson reconstruction.
///
/// The pipeline holds no mutable state, so a single instance can serve concurrent invocations.
///
/// # Example
///
/// ```no_run
/// use photomesh::{ReconstructionConfig, SfmPipeline};
///
/// let pipeline = SfmPipeline::new(ReconstructionConfig::default());
/// let report = pipeline.reconstruct("left.jpg", "right.jpg", "out/model.glb")?;
/// println!("{} faces", report.faces);
/// # Ok::<(), photomesh::ReconstructError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SfmPipeline<
    F = OrbDetector,
    M = BruteForceMatcher,
    P = EssentialRansac,
    S = PoissonReconstructor,
> {
    config: ReconstructionConfig,
    detector: F,
    matcher: M,
    pose_solver: P,
    surface_fitter: S,
}

impl SfmPipeline {
    /// Create a pipeline with the default components configured by `config`.
    pub fn new(config: ReconstructionConfig) -> Self {
        Self {
            detector: config.features.detector(),
            matcher: BruteForceMatcher,
            pose_solver: config.pose,
            surface_fitter: PoissonReconstructor::new(config.poisson),
            config,
        }
    }
}

impl Default for SfmPipeline {
    fn default() -> Self {
        Self::new(ReconstructionConfig::default())
    }
}

impl<F, M, P, S> SfmPipeline<F, M, P, S>
where
    F: FeatureDetector,
    M: DescriptorMatcher<F::Descriptor>,
    P: RobustPoseSolver,
    S: SurfaceFitter,
{
    /// Create a pipeline from explicit components.
    ///
    /// Only the settings not owned by a component are read from `config`: ratio test,
    /// intrinsics, point cloud assembly and time budget.
    pub fn from_components(
        config: ReconstructionConfig,
        detector: F,
        matcher: M,
        pose_solver: P,
        surface_fitter: S,
    ) -> Self {
        Self {
            config,
            detector,
            matcher,
            pose_solver,
            surface_fitter,
        }
    }

    /// The pipeline settings.
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Reconstruct a mesh from two image files and write it to `output`.
    ///
    /// # Errors
    ///
    /// Any stage failure is returned as is; `output` is only written after every stage has
    /// succeeded, and atomically.
    pub fn reconstruct(
        &self,
        image_a: impl AsRef<Path>,
        image_b: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<ReconstructionReport, ReconstructError> {
        let start = Instant::now();
        let deadline = Deadline::from_timeout(self.config.timeout);

        let image_a = load_image(image_a.as_ref())?;
        let image_b = load_image(image_b.as_ref())?;

        self.run(&image_a, &image_b, output.as_ref(), start, &deadline)
    }

    /// Reconstruct a mesh from two decoded images and write it to `output`.
    pub fn reconstruct_images(
        &self,
        image_a: &Image<u8, 3>,
        image_b: &Image<u8, 3>,
        output: impl AsRef<Path>,
    ) -> Result<ReconstructionReport, ReconstructError> {
        let start = Instant::now();
        let deadline = Deadline::from_timeout(self.config.timeout);
        self.run(image_a, image_b, output.as_ref(), start, &deadline)
    }

    fn run(
        &self,
        image_a: &Image<u8, 3>,
        image_b: &Image<u8, 3>,
        output: &Path,
        start: Instant,
        deadline: &Deadline,
    ) -> Result<ReconstructionReport, ReconstructError> {
        check_deadline(deadline, "feature extraction")?;
        let (keypoints_a, descriptors_a) = self.extract(image_a)?;
        let (keypoints_b, descriptors_b) = self.extract(image_b)?;
        info!(
            "features: {} keypoints in image A, {} in image B",
            keypoints_a.len(),
            keypoints_b.len()
        );

        check_deadline(deadline, "matching")?;
        let matches = match_ratio_test(
            &self.matcher,
            &descriptors_a,
            &descriptors_b,
            &self.config.ratio_test(),
        )?;
        info!("matching: {} correspondences", matches.len());

        let x1: Vec<DVec2> = matches
            .iter()
            .map(|m| keypoint_pixel(&keypoints_a[m.query]))
            .collect();
        let x2: Vec<DVec2> = matches
            .iter()
            .map(|m| keypoint_pixel(&keypoints_b[m.train]))
            .collect();

        check_deadline(deadline, "pose estimation")?;
        let intrinsics: CameraIntrinsics = self.config.intrinsics.resolve(image_a.size());
        debug!("intrinsics: {intrinsics:?}");
        let estimate = self.pose_solver.estimate(&x1, &x2, &intrinsics)?;
        info!(
            "pose: {} inliers, translation {:?}",
            estimate.inlier_count, estimate.pose.translation
        );

        check_deadline(deadline, "triangulation")?;
        let triangulation =
            Triangulator::new(&estimate.pose, &intrinsics).triangulate(&x1, &x2, &estimate.inliers);
        info!(
            "triangulation: {} points, {} dropped",
            triangulation.len(),
            triangulation.dropped
        );
        if triangulation.is_empty() {
            return Err(PointCloudError::EmptyPointCloud.into());
        }

        let pixels: Vec<DVec2> = triangulation.indices.iter().map(|&i| x1[i]).collect();
        let cloud = self
            .config
            .pointcloud
            .build(&triangulation.points, &pixels, image_a)?;
        info!("point cloud: {} points", cloud.len());

        check_deadline(deadline, "surface reconstruction")?;
        let mesh = self.surface_fitter.fit(&cloud, deadline)?;
        if mesh.is_empty() {
            return Err(SurfaceError::EmptyMesh.into());
        }
        info!(
            "surface: {} vertices, {} faces",
            mesh.num_vertices(),
            mesh.num_faces()
        );

        check_deadline(deadline, "export")?;
        let format = write_mesh(output, &mesh)?;
        let elapsed = start.elapsed();
        info!("export: wrote {output:?} as {format:?} in {elapsed:.2?}");

        Ok(ReconstructionReport {
            keypoints: [keypoints_a.len(), keypoints_b.len()],
            matches: matches.len(),
            inliers: estimate.inlier_count,
            points: cloud.len(),
            dropped_points: triangulation.dropped,
            vertices: mesh.num_vertices(),
            faces: mesh.num_faces(),
            format,
            elapsed,
        })
    }

    fn extract(
        &self,
        image: &Image<u8, 3>,
    ) -> Result<(Vec<Keypoint>, Vec<F::Descriptor>), ReconstructError> {
        if image.is_empty() {
            return Err(FeatureError::EmptyImage {
                width: image.width(),
                height: image.height(),
            }
            .into());
        }
        let gray = gray_from_rgb_u8(image).map_err(FeatureError::from)?;
        Ok(self.detector.detect_and_compute(&gray)?)
    }
}

fn load_image(path: &Path) -> Result<Image<u8, 3>, ReconstructError> {
    let image = read_image_rgb8(path).map_err(|source| ReconstructError::LoadImage {
        path: path.to_owned(),
        source,
    })?;
    debug!("loaded {path:?}: {}", image.size());
    Ok(image)
}

fn keypoint_pixel(keypoint: &Keypoint) -> DVec2 {
    DVec2::new(keypoint.x as f64, keypoint.y as f64)
}

fn check_deadline(deadline: &Deadline, stage: &'static str) -> Result<(), ReconstructError> {
    if deadline.expired() {
        return Err(ReconstructError::Timeout { stage });
    }
    Ok(())
}
