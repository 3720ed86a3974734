//! Candidate images: decoded clothing photos at the scorer's canonical size.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};

/// Side length, in pixels, every candidate is resized to before scoring.
pub const CANDIDATE_SIZE: u32 = 224;

/// A decoded RGB image, always exactly [`CANDIDATE_SIZE`] x [`CANDIDATE_SIZE`].
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateImage {
    pixels: RgbImage,
}

impl CandidateImage {
    /// Decode an encoded image (any format `image` can guess) and resize it.
    pub fn decode(bytes: &[u8]) -> image::ImageResult<Self> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(&img))
    }

    /// Resize an already decoded image. The resize is exact, aspect ratio is not kept.
    pub fn from_image(img: &DynamicImage) -> Self {
        let pixels = if img.width() == CANDIDATE_SIZE && img.height() == CANDIDATE_SIZE {
            img.to_rgb8()
        } else {
            img.resize_exact(CANDIDATE_SIZE, CANDIDATE_SIZE, FilterType::CatmullRom)
                .to_rgb8()
        };
        Self { pixels }
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Re-encode as JPEG.
    pub fn to_jpeg(&self) -> image::ImageResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.pixels.write_to(&mut buf, ImageFormat::Jpeg)?;
        Ok(buf.into_inner())
    }
}
