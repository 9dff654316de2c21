//! Image decoding and preprocessing for the BLIP vision encoder.
//!
//! BLIP expects a 384×384, 3-channel RGB tensor normalised with the CLIP
//! mean/std. Any decodable input mode (grayscale, palette, RGBA, …) is
//! converted to RGB before tensorisation.

use std::path::Path;

use candle_core::{DType, Device, Tensor};

use crate::caption::engine::CaptionError;

/// Side length of the square input expected by the BLIP vision encoder.
pub const IMAGE_SIZE: usize = 384;

const IMAGE_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const IMAGE_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Decode `path` and return a 384×384 RGB image.
///
/// # Errors
///
/// [`CaptionError::Decode`] when the file cannot be opened or is not a
/// decodable image.
pub fn decode_rgb(path: &Path) -> Result<image::RgbImage, CaptionError> {
    let img = image::open(path)
        .map_err(|e| CaptionError::Decode(format!("{}: {e}", path.display())))?;

    let img = img.resize_to_fill(
        IMAGE_SIZE as u32,
        IMAGE_SIZE as u32,
        image::imageops::FilterType::Triangle,
    );

    // to_rgb8 folds every input mode down to 3-channel RGB.
    Ok(img.to_rgb8())
}

/// Decode `path` into a normalised `(3, 384, 384)` f32 tensor on `device`.
pub fn load_image_tensor(path: &Path, device: &Device) -> Result<Tensor, CaptionError> {
    let rgb = decode_rgb(path)?;
    let data = rgb.into_raw();

    let pixels = Tensor::from_vec(data, (IMAGE_SIZE, IMAGE_SIZE, 3), device)?
        .permute((2, 0, 1))?;

    let mean = Tensor::new(&IMAGE_MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGE_STD, device)?.reshape((3, 1, 1))?;

    let tensor = (pixels.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?;

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn decode_missing_path_is_decode_error() {
        let err = decode_rgb(Path::new("/nonexistent/image.jpg")).unwrap_err();
        assert!(matches!(err, CaptionError::Decode(_)));
        assert!(err.to_string().contains("/nonexistent/image.jpg"));
    }

    #[test]
    fn decode_non_image_file_is_decode_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("not-an-image.jpg");
        std::fs::write(&path, b"plain text, not image data").expect("write");

        let err = decode_rgb(&path).unwrap_err();
        assert!(matches!(err, CaptionError::Decode(_)));
    }

    #[test]
    fn rgb_image_decodes_to_model_size() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("red.png");
        image::RgbImage::from_pixel(64, 48, image::Rgb([220, 30, 30]))
            .save(&path)
            .expect("save png");

        let rgb = decode_rgb(&path).expect("decode");
        assert_eq!(rgb.width() as usize, IMAGE_SIZE);
        assert_eq!(rgb.height() as usize, IMAGE_SIZE);
    }

    /// Grayscale inputs must be folded to 3-channel RGB, not rejected.
    #[test]
    fn grayscale_image_is_converted_to_rgb() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(32, 32, image::Luma([128]))
            .save(&path)
            .expect("save png");

        let rgb = decode_rgb(&path).expect("decode");
        assert_eq!(rgb.width() as usize, IMAGE_SIZE);
        // Every channel carries the gray value after conversion.
        let px = rgb.get_pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn tensor_has_channel_first_shape() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("blue.png");
        image::RgbImage::from_pixel(16, 16, image::Rgb([10, 20, 200]))
            .save(&path)
            .expect("save png");

        let tensor = load_image_tensor(&path, &Device::Cpu).expect("tensorise");
        assert_eq!(tensor.dims(), &[3, IMAGE_SIZE, IMAGE_SIZE]);
    }
}
