use photomesh_image::{Image, ImageError};
use rayon::prelude::*;

/// Sample an image at a sub-pixel location with bilinear interpolation.
///
/// Coordinates are clamped to the image domain.
///
/// PRECONDITION: the image is not empty.
pub fn bilinear_interpolation<const C: usize>(image: &Image<f32, C>, u: f32, v: f32) -> [f32; C] {
    let (rows, cols) = (image.height(), image.width());

    let u = u.clamp(0.0, (cols - 1) as f32);
    let v = v.clamp(0.0, (rows - 1) as f32);

    let iu0 = u.trunc() as usize;
    let iv0 = v.trunc() as usize;
    let iu1 = (iu0 + 1).min(cols - 1);
    let iv1 = (iv0 + 1).min(rows - 1);

    let frac_u = u - iu0 as f32;
    let frac_v = v - iv0 as f32;

    let w00 = (1.0 - frac_u) * (1.0 - frac_v);
    let w01 = frac_u * (1.0 - frac_v);
    let w10 = (1.0 - frac_u) * frac_v;
    let w11 = frac_u * frac_v;

    let data = image.as_slice();
    let px = |r: usize, c: usize| &data[(r * cols + c) * C..(r * cols + c + 1) * C];

    let (p00, p01, p10, p11) = (px(iv0, iu0), px(iv0, iu1), px(iv1, iu0), px(iv1, iu1));

    let mut pixel = [0.0; C];
    for k in 0..C {
        pixel[k] = p00[k] * w00 + p01[k] * w01 + p10[k] * w10 + p11[k] * w11;
    }

    pixel
}

/// Resize an image to the size of `dst` using bilinear interpolation.
///
/// Pixel centres are aligned, so a pixel `x` of the destination samples the source at
/// `(x + 0.5) * src_w / dst_w - 0.5`.
///
/// # Example
///
/// ```
/// use photomesh_image::{Image, ImageSize};
/// use photomesh_imgproc::resize::resize_bilinear;
///
/// let image = Image::<f32, 3>::new(
///     ImageSize {
///         width: 4,
///         height: 5,
///     },
///     vec![0f32; 4 * 5 * 3],
/// )
/// .unwrap();
///
/// let mut image_resized = Image::<f32, 3>::from_size_val([2, 3].into(), 0.0).unwrap();
/// resize_bilinear(&image, &mut image_resized).unwrap();
///
/// assert_eq!(image_resized.size().width, 2);
/// assert_eq!(image_resized.size().height, 3);
/// ```
pub fn resize_bilinear<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
) -> Result<(), ImageError> {
    if src.is_empty() {
        return Err(ImageError::EmptyImage(src.width(), src.height()));
    }

    let scale_x = src.width() as f32 / dst.width().max(1) as f32;
    let scale_y = src.height() as f32 / dst.height().max(1) as f32;
    let dst_cols = dst.width();

    if dst_cols == 0 {
        return Ok(());
    }

    dst.as_slice_mut()
        .par_chunks_exact_mut(dst_cols * C)
        .enumerate()
        .for_each(|(r, row)| {
            let v = (r as f32 + 0.5) * scale_y - 0.5;
            for (c, px) in row.chunks_exact_mut(C).enumerate() {
                let u = (c as f32 + 0.5) * scale_x - 0.5;
                px.copy_from_slice(&bilinear_interpolation(src, u, v));
            }
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn resize_identity() -> Result<(), ImageError> {
        let data = (0..12).map(|x| x as f32).collect();
        let image = Image::<f32, 1>::new([4, 3].into(), data)?;
        let mut out = Image::<f32, 1>::from_size_val(image.size(), 0.0)?;
        resize_bilinear(&image, &mut out)?;
        assert_eq!(out.as_slice(), image.as_slice());
        Ok(())
    }

    #[test]
    fn resize_downscale_average() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new([2, 2].into(), vec![0.0, 2.0, 4.0, 6.0])?;
        let mut out = Image::<f32, 1>::from_size_val([1, 1].into(), 0.0)?;
        resize_bilinear(&image, &mut out)?;
        assert_relative_eq!(out.as_slice()[0], 3.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn bilinear_clamps() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new([2, 1].into(), vec![1.0, 3.0])?;
        assert_relative_eq!(bilinear_interpolation(&image, 0.5, 0.0)[0], 2.0);
        assert_relative_eq!(bilinear_interpolation(&image, 5.0, -1.0)[0], 3.0);
        Ok(())
    }
}
