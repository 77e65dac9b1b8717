use photomesh_image::{Image, ImageSize};

use crate::{
    features::{fast_feature_detector, FeatureDetector, FeatureError, HarrisResponse, Keypoint},
    filter::gaussian_blur,
    pyramid::build_pyramid,
};

use super::pattern::BriefPattern;

/// A 256-bit binary descriptor.
pub type OrbDescriptor = [u8; 32];

/// Oriented FAST keypoints with rotated BRIEF descriptors.
///
/// Keypoints are detected on every level of a scale pyramid, ranked by their Harris response
/// and spread over the image with a grid of `cell_size` buckets.
#[derive(Clone, Debug)]
pub struct OrbDetector {
    /// Maximum number of keypoints over all pyramid levels.
    pub n_features: usize,
    /// Ratio between the sizes of two consecutive pyramid levels.
    pub scale_factor: f32,
    /// Number of pyramid levels.
    pub n_levels: usize,
    /// Contiguous arc length of the FAST segment test.
    pub fast_n: usize,
    /// FAST threshold, in intensity units, tried first on every level.
    pub ini_fast_threshold: f32,
    /// FAST threshold used when a level yields fewer corners than its quota.
    pub min_fast_threshold: f32,
    /// Harris sensitivity parameter.
    pub harris_k: f32,
    /// Keypoints closer than this to a level border are discarded.
    pub edge_threshold: usize,
    /// Side of the square buckets used to spread keypoints over a level.
    pub cell_size: usize,
    pattern: BriefPattern,
}

/// Radius of the disc used for the intensity centroid.
const ORIENTATION_RADIUS: i32 = 15;

/// Seed of the BRIEF sampling pattern.
const PATTERN_SEED: u64 = 0x0b1f_5eed;

#[derive(Clone, Copy, Debug)]
struct Candidate {
    x: usize,
    y: usize,
    response: f32,
}

impl Default for OrbDetector {
    fn default() -> Self {
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            fast_n: 9,
            ini_fast_threshold: 20.0,
            min_fast_threshold: 7.0,
            harris_k: 0.04,
            edge_threshold: 19,
            cell_size: 35,
            pattern: BriefPattern::from_seed(PATTERN_SEED),
        }
    }
}

impl OrbDetector {
    /// Create a detector with the default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of keypoints.
    pub fn with_n_features(mut self, n_features: usize) -> Self {
        self.n_features = n_features;
        self
    }

    /// Set the pyramid geometry.
    pub fn with_pyramid(mut self, n_levels: usize, scale_factor: f32) -> Self {
        self.n_levels = n_levels.max(1);
        self.scale_factor = scale_factor;
        self
    }

    /// Set the initial and fallback FAST thresholds.
    pub fn with_fast_thresholds(mut self, ini: f32, min: f32) -> Self {
        self.ini_fast_threshold = ini;
        self.min_fast_threshold = min;
        self
    }

    /// Replace the BRIEF sampling pattern by the one generated from `seed`.
    pub fn with_pattern_seed(mut self, seed: u64) -> Self {
        self.pattern = BriefPattern::from_seed(seed);
        self
    }

    /// Split the keypoint budget over the levels as a geometric series of ratio
    /// `1 / scale_factor`.
    fn features_per_level(&self, n_levels: usize) -> Vec<usize> {
        let mut features_per_level = vec![0usize; n_levels];
        if n_levels == 0 {
            return features_per_level;
        }

        let factor = 1.0f32 / self.scale_factor;
        let mut n_desired = if (1.0 - factor.powi(n_levels as i32)).abs() > f32::EPSILON {
            (self.n_features as f32) * (1.0 - factor) / (1.0 - factor.powi(n_levels as i32))
        } else {
            self.n_features as f32 / n_levels as f32
        };

        let mut sum = 0usize;
        for item in features_per_level.iter_mut().take(n_levels - 1) {
            let n = n_desired.round().max(0.0) as usize;
            *item = n;
            sum += n;
            n_desired *= factor;
        }
        features_per_level[n_levels - 1] = self.n_features.saturating_sub(sum);

        features_per_level
    }

    fn detect_level(
        &self,
        level: &Image<f32, 1>,
        quota: usize,
    ) -> Result<Vec<Candidate>, FeatureError> {
        if quota == 0 {
            return Ok(Vec::new());
        }

        let mut corners = fast_feature_detector(
            level,
            self.ini_fast_threshold,
            self.fast_n,
            self.edge_threshold,
            true,
        );

        if corners.len() < quota {
            corners = fast_feature_detector(
                level,
                self.min_fast_threshold,
                self.fast_n,
                self.edge_threshold,
                true,
            );
        }

        if corners.is_empty() {
            return Ok(Vec::new());
        }

        let harris = HarrisResponse::new(level)?.with_k(self.harris_k);
        let candidates: Vec<Candidate> = corners
            .iter()
            .map(|c| Candidate {
                x: c.x,
                y: c.y,
                response: harris.response_at(c.x, c.y),
            })
            .collect();

        Ok(distribute_grid(candidates, level.size(), self.cell_size, quota))
    }
}

impl FeatureDetector for OrbDetector {
    type Descriptor = OrbDescriptor;

    fn detect_and_compute(
        &self,
        image: &Image<f32, 1>,
    ) -> Result<(Vec<Keypoint>, Vec<OrbDescriptor>), FeatureError> {
        if image.is_empty() {
            return Err(FeatureError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }

        let pyramid = build_pyramid(
            image,
            self.n_levels,
            self.scale_factor,
            2 * self.edge_threshold + 1,
        )?;
        let features_per_level = self.features_per_level(pyramid.len());

        let mut keypoints = Vec::new();
        let mut descriptors = Vec::new();

        for (octave, level) in pyramid.iter().enumerate() {
            let candidates = self.detect_level(level, features_per_level[octave])?;
            if candidates.is_empty() {
                continue;
            }

            let mut blurred = Image::from_size_val(level.size(), 0.0f32)?;
            gaussian_blur(level, &mut blurred, (7, 7), (2.0, 2.0))?;

            let scale_x = image.width() as f32 / level.width() as f32;
            let scale_y = image.height() as f32 / level.height() as f32;

            for cand in candidates {
                let angle = intensity_centroid_angle(level, cand.x, cand.y);
                descriptors.push(rotated_brief(&blurred, &self.pattern, cand.x, cand.y, angle));
                keypoints.push(Keypoint {
                    x: (cand.x as f32 + 0.5) * scale_x - 0.5,
                    y: (cand.y as f32 + 0.5) * scale_y - 0.5,
                    scale: scale_x,
                    angle,
                    response: cand.response,
                    octave,
                });
            }
        }

        log::debug!(
            "orb: {} keypoints over {} pyramid levels",
            keypoints.len(),
            pyramid.len()
        );

        Ok((keypoints, descriptors))
    }
}

/// Keep at most `quota` candidates, spread over square buckets of `cell_size` pixels.
///
/// Every bucket is ranked by response; buckets then hand out their best remaining candidate in
/// turns, and the last incomplete turn prefers the strongest responses.
fn distribute_grid(
    candidates: Vec<Candidate>,
    size: ImageSize,
    cell_size: usize,
    quota: usize,
) -> Vec<Candidate> {
    if candidates.len() <= quota {
        return candidates;
    }

    let cell_size = cell_size.max(1);
    let grid_cols = size.width.div_ceil(cell_size);
    let grid_rows = size.height.div_ceil(cell_size);

    let mut cells: Vec<Vec<Candidate>> = vec![Vec::new(); grid_cols * grid_rows];
    for cand in candidates {
        cells[(cand.y / cell_size) * grid_cols + cand.x / cell_size].push(cand);
    }
    for cell in cells.iter_mut() {
        cell.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then_with(|| (a.y, a.x).cmp(&(b.y, b.x)))
        });
    }

    let mut selected = Vec::with_capacity(quota);
    let mut round = 0;
    while selected.len() < quota {
        let mut turn: Vec<Candidate> = cells.iter().filter_map(|c| c.get(round).copied()).collect();
        if turn.is_empty() {
            break;
        }

        let remaining = quota - selected.len();
        if turn.len() > remaining {
            turn.sort_by(|a, b| {
                b.response
                    .total_cmp(&a.response)
                    .then_with(|| (a.y, a.x).cmp(&(b.y, b.x)))
            });
            turn.truncate(remaining);
        }

        selected.extend(turn);
        round += 1;
    }

    selected
}

/// Orientation of the intensity centroid of the disc around `(x, y)`.
///
/// Returns `atan2(m01, m10)` in radians, with `y` pointing down the rows.
fn intensity_centroid_angle(src: &Image<f32, 1>, x: usize, y: usize) -> f32 {
    let (cols, rows) = (src.width() as i32, src.height() as i32);
    let data = src.as_slice();
    let radius2 = ORIENTATION_RADIUS * ORIENTATION_RADIUS;

    let mut m01 = 0f32;
    let mut m10 = 0f32;

    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        let yy = y as i32 + dy;
        if yy < 0 || yy >= rows {
            continue;
        }

        let mut row_sum = 0f32;
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            let xx = x as i32 + dx;
            if dx * dx + dy * dy > radius2 || xx < 0 || xx >= cols {
                continue;
            }
            let value = data[(yy * cols + xx) as usize];
            m10 += value * dx as f32;
            row_sum += value;
        }
        m01 += row_sum * dy as f32;
    }

    m01.atan2(m10)
}

/// Rotated BRIEF: 256 intensity comparisons packed into 32 bytes.
///
/// Each pattern pair is rotated by `angle` around the keypoint; bit `i` is set when the first
/// sample of pair `i` is darker than the second. Samples falling outside the image leave the bit
/// cleared.
fn rotated_brief(
    src: &Image<f32, 1>,
    pattern: &BriefPattern,
    x: usize,
    y: usize,
    angle: f32,
) -> OrbDescriptor {
    let (cols, rows) = (src.width() as i32, src.height() as i32);
    let data = src.as_slice();
    let (sin_a, cos_a) = angle.sin_cos();

    let sample = |px: i8, py: i8| -> Option<f32> {
        let (px, py) = (px as f32, py as f32);
        let xx = x as i32 + (cos_a * px - sin_a * py).round() as i32;
        let yy = y as i32 + (sin_a * px + cos_a * py).round() as i32;
        if xx < 0 || xx >= cols || yy < 0 || yy >= rows {
            return None;
        }
        Some(data[(yy * cols + xx) as usize])
    };

    let mut descriptor = [0u8; 32];
    for (bit, pair) in pattern.pairs().iter().enumerate() {
        if let (Some(v0), Some(v1)) = (sample(pair[0], pair[1]), sample(pair[2], pair[3])) {
            if v0 < v1 {
                descriptor[bit / 8] |= 1 << (bit % 8);
            }
        }
    }

    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::orb::hamming_distance;
    use photomesh_image::ImageError;

    fn make_gradient_x(size: usize) -> Result<Image<f32, 1>, ImageError> {
        let data = (0..size * size).map(|i| (i % size) as f32).collect();
        Image::new([size, size].into(), data)
    }

    fn make_gradient_y(size: usize) -> Result<Image<f32, 1>, ImageError> {
        let data = (0..size * size).map(|i| (i / size) as f32).collect();
        Image::new([size, size].into(), data)
    }

    // deterministic block texture with plenty of corners
    fn make_texture(width: usize, height: usize) -> Result<Image<f32, 1>, ImageError> {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let (bx, by) = (x / 8, y / 8);
                let h = (bx * 7919 + by * 104729 + bx * by * 31) % 251;
                data.push(h as f32);
            }
        }
        Image::new([width, height].into(), data)
    }

    #[test]
    fn test_corner_orientations_gradient() -> Result<(), ImageError> {
        let size = 31;
        let ori_x = intensity_centroid_angle(&make_gradient_x(size)?, size / 2, size / 2);
        assert!(ori_x.abs() < 0.1, "expected ~0 rad, got {ori_x}");

        let ori_y = intensity_centroid_angle(&make_gradient_y(size)?, size / 2, size / 2);
        let expected = std::f32::consts::FRAC_PI_2;
        assert!(
            (ori_y - expected).abs() < 0.1,
            "expected ~pi/2 rad, got {ori_y}"
        );
        Ok(())
    }

    #[test]
    fn test_features_per_level_sum() {
        let orb = OrbDetector::default();
        let per_level = orb.features_per_level(8);
        assert_eq!(per_level.len(), 8);
        assert_eq!(per_level.iter().sum::<usize>(), 500);
        assert!(per_level[0] > per_level[7]);
    }

    #[test]
    fn test_empty_image() {
        let img = Image::<f32, 1>::new([0, 0].into(), vec![]).unwrap();
        let res = OrbDetector::default().detect_and_compute(&img);
        assert!(matches!(res, Err(FeatureError::EmptyImage { .. })));
    }

    #[test]
    fn test_blank_image_has_no_features() -> Result<(), FeatureError> {
        let img = Image::<f32, 1>::from_size_val([128, 96].into(), 127.0)?;
        let (kps, descs) = OrbDetector::default().detect_and_compute(&img)?;
        assert!(kps.is_empty());
        assert!(descs.is_empty());
        Ok(())
    }

    #[test]
    fn test_detect_textured() -> Result<(), FeatureError> {
        let img = make_texture(160, 120)?;
        let orb = OrbDetector::default().with_n_features(200);
        let (kps, descs) = orb.detect_and_compute(&img)?;

        assert!(!kps.is_empty());
        assert!(kps.len() <= 200);
        assert_eq!(kps.len(), descs.len());
        for kp in &kps {
            assert!(kp.x >= 0.0 && kp.x < 160.0);
            assert!(kp.y >= 0.0 && kp.y < 120.0);
        }

        // detection is deterministic
        let (kps2, descs2) = orb.detect_and_compute(&img)?;
        assert_eq!(kps, kps2);
        assert_eq!(descs, descs2);
        Ok(())
    }

    #[test]
    fn test_descriptor_shift_invariance() -> Result<(), FeatureError> {
        let img = make_texture(120, 120)?;
        // the same content shifted by 8 pixels
        let mut shifted = Image::<f32, 1>::from_size_val(img.size(), 0.0)?;
        for y in 0..120 {
            for x in 0..112 {
                shifted.set_pixel(x + 8, y, 0, img.get_pixel(x, y, 0)?)?;
            }
        }

        let pattern = BriefPattern::from_seed(PATTERN_SEED);
        let a = rotated_brief(&img, &pattern, 50, 60, 0.3);
        let b = rotated_brief(&shifted, &pattern, 58, 60, 0.3);
        assert_eq!(hamming_distance(&a, &b), 0);
        Ok(())
    }
}
