use photomesh_image::{Image, ImageError};
use rayon::prelude::*;

use super::kernels;

/// Apply a separable filter to an image.
///
/// A horizontal pass with `kernel_x` is followed by a vertical pass with `kernel_y`. Samples
/// outside the image are replicated from the nearest border pixel.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn separable_filter<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            dst.width(),
            dst.height(),
        ));
    }

    let (rows, cols) = (src.height(), src.width());
    if rows == 0 || cols == 0 {
        return Ok(());
    }

    let half_x = (kernel_x.len() / 2) as isize;
    let half_y = (kernel_y.len() / 2) as isize;
    let src_data = src.as_slice();
    let row_stride = cols * C;

    let mut temp = vec![0.0f32; src_data.len()];

    temp.par_chunks_exact_mut(row_stride)
        .enumerate()
        .for_each(|(r, temp_row)| {
            let src_row = &src_data[r * row_stride..(r + 1) * row_stride];
            for c in 0..cols {
                let mut acc = [0.0f32; C];
                for (i, &k) in kernel_x.iter().enumerate() {
                    let x = (c as isize + i as isize - half_x).clamp(0, cols as isize - 1) as usize;
                    for (ch, acc_val) in acc.iter_mut().enumerate() {
                        *acc_val += src_row[x * C + ch] * k;
                    }
                }
                temp_row[c * C..(c + 1) * C].copy_from_slice(&acc);
            }
        });

    dst.as_slice_mut()
        .par_chunks_exact_mut(row_stride)
        .enumerate()
        .for_each(|(r, dst_row)| {
            for (i, &k) in kernel_y.iter().enumerate() {
                let y = (r as isize + i as isize - half_y).clamp(0, rows as isize - 1) as usize;
                let temp_row = &temp[y * row_stride..(y + 1) * row_stride];
                if i == 0 {
                    dst_row
                        .iter_mut()
                        .zip(temp_row)
                        .for_each(|(d, &t)| *d = t * k);
                } else {
                    dst_row
                        .iter_mut()
                        .zip(temp_row)
                        .for_each(|(d, &t)| *d += t * k);
                }
            }
        });

    Ok(())
}

/// Blur an image using a gaussian blur filter
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_size` - The size of the kernel (kernel_x, kernel_y); zero derives it from sigma.
/// * `sigma` - The sigma of the gaussian kernel (sigma_x, sigma_y); a zero `sigma_y` reuses `sigma_x`.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn gaussian_blur<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_size: (usize, usize),
    sigma: (f32, f32),
) -> Result<(), ImageError> {
    let sigma_y = if sigma.1 > 0.0 { sigma.1 } else { sigma.0 };
    let kernel_x = kernels::gaussian_kernel_1d(kernel_size.0, sigma.0);
    let kernel_y = kernels::gaussian_kernel_1d(kernel_size.1, sigma_y);
    separable_filter(src, dst, &kernel_x, &kernel_y)
}

/// Compute the horizontal and vertical sobel derivatives of a single channel image.
pub fn spatial_gradient(src: &Image<f32, 1>) -> Result<(Image<f32, 1>, Image<f32, 1>), ImageError> {
    let (deriv, smooth) = kernels::sobel_kernel_1d();

    let mut gx = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    separable_filter(src, &mut gx, &deriv, &smooth)?;

    let mut gy = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    separable_filter(src, &mut gy, &smooth, &deriv)?;

    Ok((gx, gy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use photomesh_image::ImageSize;

    #[test]
    fn test_separable_filter_impulse() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 5,
        };

        let mut img = Image::<f32, 1>::from_size_val(size, 0.0)?;
        img.set_pixel(2, 2, 0, 9.0)?;

        let kernel = [1.0 / 3.0; 3];
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        separable_filter(&img, &mut dst, &kernel, &kernel)?;

        #[rustfmt::skip]
        let expected = [
            0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 1.0, 1.0, 0.0,
            0.0, 1.0, 1.0, 1.0, 0.0,
            0.0, 1.0, 1.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0,
        ];

        for (a, b) in dst.as_slice().iter().zip(expected.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }

        Ok(())
    }

    #[test]
    fn test_gaussian_blur_constant() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 6,
            height: 4,
        };
        let img = Image::<f32, 3>::from_size_val(size, 10.0)?;
        let mut dst = Image::<f32, 3>::from_size_val(size, 0.0)?;
        gaussian_blur(&img, &mut dst, (0, 0), (1.5, 0.0))?;

        for v in dst.as_slice() {
            assert_relative_eq!(*v, 10.0, epsilon = 1e-4);
        }

        Ok(())
    }

    #[test]
    fn test_spatial_gradient_ramp() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 5,
        };
        let data = (0..25).map(|i| (i % 5) as f32).collect();
        let img = Image::<f32, 1>::new(size, data)?;
        let (gx, gy) = spatial_gradient(&img)?;

        assert_relative_eq!(gx.get_pixel(2, 2, 0)?, 8.0, epsilon = 1e-5);
        assert_relative_eq!(gy.get_pixel(2, 2, 0)?, 0.0, epsilon = 1e-5);

        Ok(())
    }

    #[test]
    fn test_size_mismatch() -> Result<(), ImageError> {
        let img = Image::<f32, 1>::from_size_val([3, 3].into(), 0.0)?;
        let mut dst = Image::<f32, 1>::from_size_val([4, 3].into(), 0.0)?;
        assert!(separable_filter(&img, &mut dst, &[1.0], &[1.0]).is_err());
        Ok(())
    }
}
