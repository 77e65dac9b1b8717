use photomesh_image::{Image, ImageError};

use crate::filter::spatial_gradient;

/// Harris corner response evaluated at a sparse set of locations.
///
/// The image gradients are computed once per image; the structure tensor is then accumulated
/// over a square `block_size` window around every requested point.
pub struct HarrisResponse {
    gx: Image<f32, 1>,
    gy: Image<f32, 1>,
    k: f32,
    block_size: usize,
}

impl HarrisResponse {
    /// Prepare the gradients of `src`.
    pub fn new(src: &Image<f32, 1>) -> Result<Self, ImageError> {
        let (gx, gy) = spatial_gradient(src)?;
        Ok(Self {
            gx,
            gy,
            k: 0.04,
            block_size: 7,
        })
    }

    /// Set the sensitivity parameter `k` of `det(M) - k * trace(M)^2`.
    pub fn with_k(mut self, k: f32) -> Self {
        self.k = k;
        self
    }

    /// Set the side of the accumulation window.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Response at pixel `(x, y)`. Window samples outside the image are skipped.
    pub fn response_at(&self, x: usize, y: usize) -> f32 {
        let (cols, rows) = (self.gx.width() as i64, self.gx.height() as i64);
        let half = (self.block_size / 2) as i64;
        let (gx, gy) = (self.gx.as_slice(), self.gy.as_slice());

        let (mut sxx, mut syy, mut sxy) = (0f32, 0f32, 0f32);
        for yy in (y as i64 - half).max(0)..=(y as i64 + half).min(rows - 1) {
            for xx in (x as i64 - half).max(0)..=(x as i64 + half).min(cols - 1) {
                let idx = (yy * cols + xx) as usize;
                let (dx, dy) = (gx[idx], gy[idx]);
                sxx += dx * dx;
                syy += dy * dy;
                sxy += dx * dy;
            }
        }

        let det = sxx * syy - sxy * sxy;
        let trace = sxx + syy;
        det - self.k * trace * trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harris_corner_beats_edge_and_flat() -> Result<(), ImageError> {
        let size = 21;
        let mut img = Image::<f32, 1>::from_size_val([size, size].into(), 0.0)?;
        for y in 10..size {
            for x in 10..size {
                img.set_pixel(x, y, 0, 255.0)?;
            }
        }

        let harris = HarrisResponse::new(&img)?.with_k(0.04);
        let corner = harris.response_at(10, 10);
        let edge = harris.response_at(10, 17);
        let flat = harris.response_at(3, 3);

        assert!(corner > 0.0);
        assert!(edge < corner);
        assert!(flat.abs() < 1e-6);

        Ok(())
    }
}
