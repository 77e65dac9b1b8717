use glam::{DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// Intrinsic parameters of a pinhole camera with square pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// The focal length in pixels.
    pub focal: f64,
    /// Principal point column in pixels.
    pub cx: f64,
    /// Principal point row in pixels.
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Creates new intrinsics from a focal length and a principal point.
    pub fn new(focal: f64, cx: f64, cy: f64) -> Self {
        Self { focal, cx, cy }
    }

    /// Approximate intrinsics of an uncalibrated image.
    ///
    /// The focal length is `focal_ratio * width` and the principal point is the image centre.
    pub fn approximate(width: usize, height: usize, focal_ratio: f64) -> Self {
        Self {
            focal: focal_ratio * width as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    /// The camera matrix `K`.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(self.focal, 0.0, 0.0),
            DVec3::new(0.0, self.focal, 0.0),
            DVec3::new(self.cx, self.cy, 1.0),
        )
    }

    /// Map a pixel to normalized image coordinates, `K^-1 [u, v, 1]`.
    pub fn unproject(&self, pixel: DVec2) -> DVec2 {
        DVec2::new(
            (pixel.x - self.cx) / self.focal,
            (pixel.y - self.cy) / self.focal,
        )
    }

    /// Project a point in camera coordinates to pixels.
    ///
    /// Returns `None` for points on the camera plane.
    pub fn project(&self, point: DVec3) -> Option<DVec2> {
        if point.z.abs() < f64::EPSILON {
            return None;
        }
        Some(DVec2::new(
            self.focal * point.x / point.z + self.cx,
            self.focal * point.y / point.z + self.cy,
        ))
    }
}
