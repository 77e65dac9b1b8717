use photomesh_image::{Image, ImageError, ImageSize};

use crate::filter::gaussian_blur;
use crate::resize::resize_bilinear;

/// Smooth and downsample an image by `downscale`.
///
/// The image is blurred with `sigma = 2 * downscale / 6` to limit aliasing and then resized
/// with bilinear interpolation to `ceil(size / downscale)`.
pub fn pyramid_reduce(img: &Image<f32, 1>, downscale: f32) -> Result<Image<f32, 1>, ImageError> {
    let sigma = 2.0 * downscale / 6.0;

    let mut smoothed = Image::from_size_val(img.size(), 0.0)?;
    gaussian_blur(img, &mut smoothed, (0, 0), (sigma, 0.0))?;

    let new_size = ImageSize {
        width: (img.width() as f32 / downscale).ceil() as usize,
        height: (img.height() as f32 / downscale).ceil() as usize,
    };

    let mut resized = Image::from_size_val(new_size, 0.0)?;
    resize_bilinear(&smoothed, &mut resized)?;

    Ok(resized)
}

/// Build a scale pyramid with at most `n_levels` levels.
///
/// Level zero is a copy of the input. Building stops early once a level would no longer
/// shrink or would fall below `min_size` pixels on its shortest side.
pub fn build_pyramid(
    img: &Image<f32, 1>,
    n_levels: usize,
    downscale: f32,
    min_size: usize,
) -> Result<Vec<Image<f32, 1>>, ImageError> {
    let mut pyramid = Vec::with_capacity(n_levels);
    pyramid.push(img.clone());

    for _ in 1..n_levels {
        let current = &pyramid[pyramid.len() - 1];
        let next = pyramid_reduce(current, downscale)?;
        if next.size() == current.size() || next.width().min(next.height()) < min_size {
            break;
        }
        pyramid.push(next);
    }

    Ok(pyramid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pyramid_sizes() -> Result<(), ImageError> {
        let img = Image::<f32, 1>::from_size_val([120, 100].into(), 1.0)?;
        let pyramid = build_pyramid(&img, 4, 2.0, 8)?;

        let sizes: Vec<_> = pyramid.iter().map(|p| (p.width(), p.height())).collect();
        assert_eq!(sizes, vec![(120, 100), (60, 50), (30, 25), (15, 13)]);

        Ok(())
    }

    #[test]
    fn pyramid_stops_at_min_size() -> Result<(), ImageError> {
        let img = Image::<f32, 1>::from_size_val([40, 40].into(), 1.0)?;
        let pyramid = build_pyramid(&img, 8, 2.0, 16)?;
        assert_eq!(pyramid.len(), 2);
        Ok(())
    }
}
