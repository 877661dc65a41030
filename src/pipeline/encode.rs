//! Image encoding in both directions of the pipeline.
//!
//! * Rendered pages (`DynamicImage`) → JPEG files at a caller-chosen quality.
//!   JPEG has no alpha channel, so pages are flattened to RGB first.
//! * Page image files on disk → base64 [`ImageData`] for the VLM request.
//!   The bytes are passed through untouched; re-encoding a JPEG that was just
//!   written at the requested quality would only add artefacts.

use crate::error::DocprepError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Write `img` to `path` as a JPEG at `quality` (1–100).
pub fn write_jpeg(img: &DynamicImage, quality: u8, path: &Path) -> Result<(), DocprepError> {
    let file = File::create(path).map_err(|e| DocprepError::write(path, e))?;
    let mut writer = BufWriter::new(file);

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))
        .map_err(|e| DocprepError::ConversionFailed {
            backend: "jpeg".into(),
            detail: format!("encoding {} failed: {e}", path.display()),
        })?;
    writer.flush().map_err(|e| DocprepError::write(path, e))?;

    debug!(
        "Encoded {}x{} page → {} (quality {})",
        img.width(),
        img.height(),
        path.display(),
        quality
    );
    Ok(())
}

/// MIME type for a page image, from its extension.
pub fn image_mime_type(path: &Path) -> Result<&'static str, DocprepError> {
    ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .map_err(|_| DocprepError::InvalidConfig(format!(
            "unsupported image type: {}",
            path.display()
        )))
}

/// Wrap raw image bytes as a base64 [`ImageData`] attachment.
///
/// `detail: "high"` asks GPT-4-class models for the full tile budget; other
/// providers ignore it.
pub fn encode_image_bytes(bytes: &[u8], mime_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime_type).with_detail("high")
}
