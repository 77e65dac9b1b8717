use std::path::Path;

use photomesh_image::{Image, ImageSize};

use crate::error::IoError;

/// Reads an image from the given file path as 8-bit RGB.
///
/// The method tries to read from any image format supported by the image crate; the format is
/// guessed from the file contents and every colour type is converted to RGB.
///
/// # Arguments
///
/// * `file_path` - The path to a valid image file.
///
/// # Returns
///
/// An RGB image containing the decoded pixels.
pub fn read_image_rgb8(file_path: impl AsRef<Path>) -> Result<Image<u8, 3>, IoError> {
    let file_path = file_path.as_ref().to_owned();

    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path));
    }

    let bytes = std::fs::read(&file_path)?;

    let img = image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    let size = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };

    log::debug!("decoded {} ({:?}) from {:?}", size, img.color(), file_path);

    Ok(Image::<u8, 3>::new(size, img.into_rgb8().into_raw())?)
}

/// Writes an RGB image to the given file path.
///
/// The encoder is chosen from the file extension.
pub fn write_image_rgb8(file_path: impl AsRef<Path>, image: &Image<u8, 3>) -> Result<(), IoError> {
    let buffer = image::RgbImage::from_raw(
        image.width() as u32,
        image.height() as u32,
        image.as_slice().to_vec(),
    )
    .ok_or(IoError::ImageTooLarge(image.size()))?;

    buffer.save(file_path.as_ref())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{read_image_rgb8, write_image_rgb8};
    use crate::error::IoError;
    use photomesh_image::{Image, ImageSize};

    #[test]
    fn read_missing() {
        let res = read_image_rgb8("/definitely/not/here.png");
        assert!(matches!(res, Err(IoError::FileDoesNotExist(_))));
    }

    #[test]
    fn read_write_png() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("gradient.png");

        let size = ImageSize {
            width: 4,
            height: 3,
        };
        let data = (0..size.area() * 3).map(|i| (i * 7) as u8).collect();
        let image = Image::<u8, 3>::new(size, data)?;

        write_image_rgb8(&file_path, &image)?;
        let image_back = read_image_rgb8(&file_path)?;

        assert_eq!(image_back.size(), size);
        assert_eq!(image_back.as_slice(), image.as_slice());

        Ok(())
    }

    #[test]
    fn read_garbage() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("noise.jpg");
        std::fs::write(&file_path, b"not an image at all")?;

        assert!(matches!(
            read_image_rgb8(&file_path),
            Err(IoError::ImageDecodeError(_))
        ));

        Ok(())
    }
}
