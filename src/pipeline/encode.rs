//! Image encoding: `DynamicImage` → JPEG or PNG bytes.
//!
//! Pages are rendered on an opaque white background, so alpha carries no
//! information. JPEG cannot store it at all; the image is flattened to RGB8
//! before encoding either format to keep output sizes predictable.

use crate::config::ImageEncoding;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page in `encoding`.
pub fn encode_page(
    img: &DynamicImage,
    encoding: ImageEncoding,
) -> Result<Vec<u8>, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), encoding.image_format())?;

    debug!(
        "Encoded {}x{} image → {} bytes {}",
        rgb.width(),
        rgb.height(),
        buf.len(),
        encoding.extension()
    );
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_png_has_signature() {
        let bytes = encode_page(&red_square(), ImageEncoding::Png).expect("encode should succeed");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn encode_jpeg_drops_alpha() {
        let bytes = encode_page(&red_square(), ImageEncoding::Jpeg).expect("encode should succeed");
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
        let decoded = image::load_from_memory(&bytes).expect("valid jpeg");
        assert_eq!(decoded.width(), 10);
        assert!(!decoded.color().has_alpha());
    }
}
