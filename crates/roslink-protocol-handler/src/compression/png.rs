//! rosbridge "png" compression: a JSON frame packed into the RGB pixels of a
//! PNG image, base64 encoded.

use super::{CompressedPayload, Decompressor, failure};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use roslink_core::error::ProtocolError;
use serde_json::Value;

#[derive(Debug, Default, Clone, Copy)]
pub struct PngDecompressor;

impl Decompressor for PngDecompressor {
    fn name(&self) -> &str {
        "png"
    }

    fn decompress(&self, payload: CompressedPayload) -> Result<Value, ProtocolError> {
        let CompressedPayload::Text(data) = payload else {
            return Err(failure("png", "expected a base64 text payload"));
        };
        let bytes = STANDARD.decode(data.trim()).map_err(|e| failure("png", e))?;
        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .map_err(|e| failure("png", e))?;
        let mut pixels = image.to_rgb8().into_raw();

        // The last row is padded out with newlines or zeros.
        while matches!(pixels.last(), Some(b'\n' | b'\0' | b' ')) {
            pixels.pop();
        }
        serde_json::from_slice(&pixels).map_err(|e| failure("png", e))
    }
}
