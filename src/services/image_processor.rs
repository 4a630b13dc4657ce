// src/services/image_processor.rs
use crate::errors::StudioError;
use crate::models::ReferenceImage;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat as ImgFormat};
use uuid::Uuid;

const MIN_DIMENSION: u32 = 64;

pub struct ImageProcessor {
    max_dimension: u32,
}

impl ImageProcessor {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    /// Validates an uploaded photo and captures it as the session's reference.
    pub fn prepare_reference(&self, data: &[u8]) -> Result<ReferenceImage, StudioError> {
        if data.is_empty() {
            return Err(StudioError::ImageProcessing("Empty upload".to_string()));
        }

        let format = image::guess_format(data)
            .map_err(|e| StudioError::ImageProcessing(format!("Unrecognized image: {}", e)))?;
        let mime_type = mime_for(format)?;

        let img = image::load_from_memory_with_format(data, format)
            .map_err(|e| StudioError::ImageProcessing(format!("Invalid image data: {}", e)))?;

        let (width, height) = img.dimensions();
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(StudioError::ImageProcessing(format!(
                "Image is {}x{}, at least {}x{} is required",
                width, height, MIN_DIMENSION, MIN_DIMENSION
            )));
        }

        let (data, mime_type, width, height) = if width.max(height) > self.max_dimension {
            let resized = self.downscale(&img);
            let (w, h) = resized.dimensions();
            (encode_jpeg(&resized)?, "image/jpeg", w, h)
        } else {
            (data.to_vec(), mime_type, width, height)
        };

        Ok(ReferenceImage {
            id: Uuid::new_v4(),
            base64: general_purpose::STANDARD.encode(&data),
            data: Bytes::from(data),
            mime_type: mime_type.to_string(),
            width,
            height,
            uploaded_at: chrono::Utc::now(),
        })
    }

    fn downscale(&self, img: &DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let ratio = self.max_dimension as f32 / width.max(height) as f32;
        let new_width = ((width as f32 * ratio).round() as u32).max(1);
        let new_height = ((height as f32 * ratio).round() as u32).max(1);

        img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new(2048)
    }
}

fn mime_for(format: ImgFormat) -> Result<&'static str, StudioError> {
    match format {
        ImgFormat::Jpeg => Ok("image/jpeg"),
        ImgFormat::Png => Ok("image/png"),
        ImgFormat::WebP => Ok("image/webp"),
        other => Err(StudioError::ImageProcessing(format!(
            "Unsupported image format: {:?}",
            other
        ))),
    }
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, StudioError> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut output = Vec::new();
    rgb.write_to(&mut std::io::Cursor::new(&mut output), ImgFormat::Jpeg)
        .map_err(|e| {
            StudioError::ImageProcessing(format!("Failed to encode resized image: {}", e))
        })?;
    Ok(output)
}
