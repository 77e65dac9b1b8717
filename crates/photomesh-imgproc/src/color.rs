use photomesh_image::{Image, ImageError};
use rayon::prelude::*;

/// Define the RGB weights for the grayscale conversion.
const RW: f32 = 0.299;
const GW: f32 = 0.587;
const BW: f32 = 0.114;

/// Convert an 8-bit RGB image to a floating point intensity image using the formula:
///
/// Y = 0.299 * R + 0.587 * G + 0.114 * B
///
/// The output keeps the `[0, 255]` range of the input.
///
/// # Example
///
/// ```
/// use photomesh_image::{Image, ImageSize};
/// use photomesh_imgproc::color::gray_from_rgb_u8;
///
/// let image = Image::<u8, 3>::new(
///     ImageSize {
///         width: 4,
///         height: 5,
///     },
///     vec![0u8; 4 * 5 * 3],
/// )
/// .unwrap();
///
/// let gray = gray_from_rgb_u8(&image).unwrap();
/// assert_eq!(gray.num_channels(), 1);
/// assert_eq!(gray.size().width, 4);
/// assert_eq!(gray.size().height, 5);
/// ```
pub fn gray_from_rgb_u8(src: &Image<u8, 3>) -> Result<Image<f32, 1>, ImageError> {
    let mut dst = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;

    dst.as_slice_mut()
        .par_iter_mut()
        .zip(src.as_slice().par_chunks_exact(3))
        .for_each(|(g, rgb)| {
            *g = RW * rgb[0] as f32 + GW * rgb[1] as f32 + BW * rgb[2] as f32;
        });

    Ok(dst)
}
