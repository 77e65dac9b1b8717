use glam::{DVec2, DVec3};
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use photomesh_image::Image;
use serde::{Deserialize, Serialize};

use crate::linalg::principal_axes;

/// Errors raised while assembling a point cloud.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PointCloudError {
    /// No point survived triangulation.
    #[error("Point cloud is empty")]
    EmptyPointCloud,

    /// Per-point attributes do not match the number of points.
    #[error("Attribute has {found} entries for {expected} points")]
    LengthMismatch {
        /// Number of points.
        expected: usize,
        /// Number of attribute entries.
        found: usize,
    },
}

/// A point cloud with points, colors, and normals.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points, colors (optional), and normals (optional).
    ///
    /// # Errors
    ///
    /// Returns [`PointCloudError::LengthMismatch`] when colors or normals are not one per point.
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[u8; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Result<Self, PointCloudError> {
        let expected = points.len();
        let check = |found: Option<usize>| match found {
            Some(found) if found != expected => {
                Err(PointCloudError::LengthMismatch { expected, found })
            }
            _ => Ok(()),
        };
        check(colors.as_ref().map(Vec::len))?;
        check(normals.as_ref().map(Vec::len))?;

        Ok(Self {
            points,
            colors,
            normals,
        })
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Point `i` as a vector.
    #[inline]
    pub fn point(&self, i: usize) -> DVec3 {
        DVec3::from_array(self.points[i])
    }

    /// Minimum and maximum corners of the axis aligned bounding box, `None` when empty.
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        let first = DVec3::from_array(*self.points.first()?);
        Some(self.points.iter().map(|p| DVec3::from_array(*p)).fold(
            (first, first),
            |(lo, hi), p| (lo.min(p), hi.max(p)),
        ))
    }

    /// Estimate per-point normals, replacing any existing ones.
    ///
    /// Normals are oriented toward `viewpoint`.
    pub fn estimate_normals(&mut self, params: &NormalEstimation, viewpoint: DVec3) {
        self.normals = Some(params.estimate(&self.points, viewpoint));
    }
}

/// Hybrid radius / nearest neighbour normal estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalEstimation {
    /// Initial search radius.
    pub radius: f64,
    /// Maximum number of neighbours used for the covariance.
    pub max_neighbors: usize,
    /// Neighbours needed before the radius stops growing.
    pub min_neighbors: usize,
    /// Number of times the radius may double.
    pub max_radius_doublings: usize,
}

impl Default for NormalEstimation {
    fn default() -> Self {
        Self {
            radius: 0.1,
            max_neighbors: 30,
            min_neighbors: 3,
            max_radius_doublings: 8,
        }
    }
}

impl NormalEstimation {
    /// Compute a unit normal per point as the smallest principal axis of its neighbourhood.
    pub fn estimate(&self, points: &[[f64; 3]], viewpoint: DVec3) -> Vec<[f64; 3]> {
        if points.is_empty() {
            return Vec::new();
        }
        let kdtree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(points);

        let mut fallbacks = 0usize;
        let normals = points
            .iter()
            .map(|p| {
                let center = DVec3::from_array(*p);
                let toward_view = viewpoint - center;

                let mut neighbours = Vec::new();
                let mut radius = self.radius;
                for _ in 0..=self.max_radius_doublings {
                    neighbours =
                        kdtree.within_unsorted::<kiddo::SquaredEuclidean>(p, radius * radius);
                    if neighbours.len() >= self.min_neighbors {
                        break;
                    }
                    radius *= 2.0;
                }

                if neighbours.len() < 3 {
                    fallbacks += 1;
                    return toward_view.normalize_or(DVec3::Z).to_array();
                }

                neighbours.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                neighbours.truncate(self.max_neighbors.max(3));
                let local: Vec<DVec3> = neighbours
                    .iter()
                    .map(|nn| DVec3::from_array(points[nn.item as usize]))
                    .collect();

                let (_, axes) = principal_axes(&local);
                let mut n = axes.u.z_axis.normalize_or(DVec3::Z);
                if n.dot(toward_view) < 0.0 {
                    n = -n;
                }
                n.to_array()
            })
            .collect();

        if fallbacks > 0 {
            log::debug!("{fallbacks} points had too few neighbours for a normal");
        }
        normals
    }
}

/// Sample the RGB colour of an image at a pixel position, rounded and clamped to the image.
pub fn sample_color(image: &Image<u8, 3>, pixel: DVec2) -> [u8; 3] {
    if image.is_empty() {
        return [0, 0, 0];
    }
    let x = (pixel.x.round().max(0.0) as usize).min(image.width() - 1);
    let y = (pixel.y.round().max(0.0) as usize).min(image.height() - 1);
    let base = (y * image.width() + x) * 3;
    let data = image.as_slice();
    [data[base], data[base + 1], data[base + 2]]
}

/// Assembles coloured and oriented point clouds from triangulated points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudBuilder {
    /// Normal estimation settings.
    pub normals: NormalEstimation,
}

impl PointCloudBuilder {
    /// Build a point cloud with colours sampled from `image` at `pixels` and normals oriented
    /// toward the first camera centre.
    ///
    /// # Errors
    ///
    /// Returns [`PointCloudError::EmptyPointCloud`] without points, and
    /// [`PointCloudError::LengthMismatch`] when `pixels` is not one per point.
    pub fn build(
        &self,
        points: &[DVec3],
        pixels: &[DVec2],
        image: &Image<u8, 3>,
    ) -> Result<PointCloud, PointCloudError> {
        if points.is_empty() {
            return Err(PointCloudError::EmptyPointCloud);
        }
        if pixels.len() != points.len() {
            return Err(PointCloudError::LengthMismatch {
                expected: points.len(),
                found: pixels.len(),
            });
        }

        let colors = pixels.iter().map(|px| sample_color(image, *px)).collect();
        let mut cloud = PointCloud::new(
            points.iter().map(|p| p.to_array()).collect(),
            Some(colors),
            None,
        )?;
        cloud.estimate_normals(&self.normals, DVec3::ZERO);

        Ok(cloud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pointcloud() -> Result<(), PointCloudError> {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            Some(vec![[255, 0, 0], [0, 255, 0]]),
            Some(vec![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        )?;

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points().len(), 2);
        assert_eq!(pointcloud.colors().map(|c| c.len()), Some(2));
        assert_eq!(pointcloud.normals().map(|n| n.len()), Some(2));

        let (lo, hi) = pointcloud.bounds().unwrap();
        assert_eq!(lo, DVec3::ZERO);
        assert_eq!(hi, DVec3::X);

        Ok(())
    }

    #[test]
    fn test_pointcloud_length_mismatch() {
        let res = PointCloud::new(vec![[0.0; 3]; 3], Some(vec![[0; 3]; 2]), None);
        assert_eq!(
            res.err(),
            Some(PointCloudError::LengthMismatch {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_normals_of_plane_face_viewpoint() {
        // plane at z = 2 seen from the origin
        let points: Vec<[f64; 3]> = (0..100)
            .map(|i| [(i % 10) as f64 * 0.05, (i / 10) as f64 * 0.05, 2.0])
            .collect();
        let normals = NormalEstimation::default().estimate(&points, DVec3::ZERO);
        assert_eq!(normals.len(), points.len());
        for n in normals {
            assert_relative_eq!(n[2], -1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_normals_grow_radius() {
        // spacing far above the initial radius
        let points: Vec<[f64; 3]> = (0..16)
            .map(|i| [(i % 4) as f64 * 2.0, 1.0, (i / 4) as f64 * 2.0 + 5.0])
            .collect();
        let normals = NormalEstimation::default().estimate(&points, DVec3::ZERO);
        for n in normals {
            assert_relative_eq!(n[1], -1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_builder() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 3>::new(
            [2, 2].into(),
            vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120],
        )?;
        let points = vec![
            DVec3::new(0.0, 0.0, 3.0),
            DVec3::new(0.05, 0.0, 3.0),
            DVec3::new(0.0, 0.05, 3.0),
        ];
        let pixels = vec![
            DVec2::new(-4.0, 0.2),
            DVec2::new(0.6, 0.4),
            DVec2::new(9.0, 9.0),
        ];
        let cloud = PointCloudBuilder::default().build(&points, &pixels, &image)?;
        assert_eq!(
            cloud.colors().unwrap(),
            &[[10, 20, 30], [40, 50, 60], [100, 110, 120]]
        );
        assert!(cloud.normals().unwrap().iter().all(|n| n[2] < 0.0));

        assert_eq!(
            PointCloudBuilder::default().build(&[], &[], &image).err(),
            Some(PointCloudError::EmptyPointCloud)
        );
        Ok(())
    }
}
