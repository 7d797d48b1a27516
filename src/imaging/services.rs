use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::debug;

/// Variant sent to the inference service: large enough for the model to read
/// the plate, small enough to keep the request light.
pub const UPLOAD_MAX_DIMENSION: u32 = 1280;
pub const UPLOAD_QUALITY: f32 = 0.85;

/// Variant embedded in the persisted history record.
pub const STORAGE_MAX_DIMENSION: u32 = 320;
pub const STORAGE_QUALITY: f32 = 0.5;

/// Downscales an encoded image so its longest side is at most
/// `max_dimension` and recompresses it as JPEG at `quality` (0.0–1.0,
/// clamped). Images already within bounds are never upscaled, only
/// recompressed.
///
/// This function cannot fail: if the input does not decode, the original
/// bytes are returned unchanged so analysis can proceed uncompressed.
pub fn resize(input: &[u8], max_dimension: u32, quality: f32) -> Bytes {
    let decoded = match image::load_from_memory(input) {
        Ok(img) => img,
        Err(e) => {
            debug!(error = %e, "image decode failed, passing original bytes through");
            return Bytes::copy_from_slice(input);
        }
    };

    let (width, height) = (decoded.width(), decoded.height());
    let max = max_dimension.max(1) as f64;
    let scale = (max / width as f64).min(max / height as f64).min(1.0);

    let resized = if scale < 1.0 {
        let new_w = ((width as f64 * scale).round() as u32).max(1);
        let new_h = ((height as f64 * scale).round() as u32).max(1);
        decoded.resize_exact(new_w, new_h, FilterType::Triangle)
    } else {
        decoded
    };

    // JPEG output regardless of the input container; the JPEG encoder does
    // not take an alpha channel, so flatten first.
    let rgb = resized.to_rgb8();
    let q = (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, q);
    match rgb.write_with_encoder(encoder) {
        Ok(()) => Bytes::from(out),
        Err(e) => {
            debug!(error = %e, "jpeg encode failed, passing original bytes through");
            Bytes::copy_from_slice(input)
        }
    }
}
