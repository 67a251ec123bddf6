// File-based image acquisition

use crate::error::{FaceScanError, Result};
use crate::models::{Frame, ImagePayload, ImageSource};
use image::{DynamicImage, ImageFormat};
use std::path::Path;
use tracing::{debug, warn};

/// Extensions offered by the file picker
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Reads an image file selected by the user.
/// Content that is not a recognised image format is rejected.
pub fn acquire_from_file<P: AsRef<Path>>(path: P) -> Result<ImagePayload> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        FaceScanError::ImageLoad(format!("Failed to read image from {path:?}: {e}"))
    })?;

    let format = image::guess_format(&bytes).map_err(|_| {
        warn!("Rejected non-image file {:?}", path);
        FaceScanError::UnsupportedImage(format!("{} is not an image", path.display()))
    })?;
    debug!("Acquired {:?} image from {:?} ({} bytes)", format, path, bytes.len());

    Ok(ImagePayload::new(bytes, ImageSource::File(path.to_path_buf())))
}

/// Whether a path looks like an image by its extension
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decodes a payload into RGB pixels
pub fn decode_payload(payload: &ImagePayload) -> Result<Frame> {
    let img = image::load_from_memory(payload.bytes())?;
    Ok(frame_from_image(img))
}

pub fn frame_from_image(img: DynamicImage) -> Frame {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::new(rgb.into_raw(), width, height)
}

/// PNG-encodes an RGB frame
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    let buffer = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| {
            FaceScanError::FrameProcessing(format!(
                "Frame buffer does not match {}x{}",
                frame.width, frame.height
            ))
        })?;

    let mut bytes = std::io::Cursor::new(Vec::new());
    buffer.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("face-scan-input-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn solid_frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![128; (width * height * 3) as usize], width, height)
    }

    #[test]
    fn png_file_is_acquired_and_decoded() {
        let png = encode_frame(&solid_frame(8, 6)).unwrap();
        let path = scratch_file("face.png", &png);

        let payload = acquire_from_file(&path).unwrap();
        assert_eq!(payload.source(), &ImageSource::File(path));

        let frame = decode_payload(&payload).unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(frame.data.len(), 8 * 6 * 3);
    }

    #[test]
    fn non_image_content_is_rejected() {
        let path = scratch_file("notes.png", b"just some text");
        assert!(matches!(
            acquire_from_file(&path),
            Err(FaceScanError::UnsupportedImage(_))
        ));
    }

    #[test]
    fn missing_file_is_an_image_load_error() {
        let path = std::env::temp_dir().join("face-scan-does-not-exist.png");
        assert!(matches!(
            acquire_from_file(path),
            Err(FaceScanError::ImageLoad(_))
        ));
    }

    #[test]
    fn mismatched_frame_cannot_be_encoded() {
        let frame = Frame::new(vec![0; 10], 4, 4);
        assert!(encode_frame(&frame).is_err());
    }

    #[test]
    fn extensions_are_case_insensitive() {
        assert!(has_image_extension(Path::new("photo.JPG")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("no_extension")));
    }
}
