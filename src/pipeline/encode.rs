//! Image encoding: `DynamicImage` → base64 PNG wrapped in [`SlideImage`].
//!
//! OpenAI-compatible vision APIs accept images as base64 data URLs embedded
//! in the JSON request body. PNG keeps rendered text crisp.

use crate::output::SlideImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered slide as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<SlideImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded slide image → {} bytes base64", b64.len());

    Ok(SlideImage::new(b64, "image/png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
        assert!(data.to_data_url().starts_with("data:image/png;base64,"));
    }
}
