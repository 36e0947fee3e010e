use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use tracing::debug;
use wr_state::ImagePayload;

use crate::error::{CaptureError, CaptureResult};
use crate::stream::StreamHandle;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Grabs stills from a live stream and turns them into request payloads
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    quality: u8,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameSampler {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Grab the current frame at native resolution and encode it.
    /// The stream keeps running.
    pub async fn capture(&self, stream: &StreamHandle) -> CaptureResult<ImagePayload> {
        if !stream.is_active() {
            return Err(CaptureError::NoFrameAvailable);
        }

        let stream = stream.clone();
        let quality = self.quality;
        tokio::task::spawn_blocking(move || {
            let frame = stream.grab_frame()?;
            encode_frame(&frame, quality)
        })
        .await
        .map_err(|_| CaptureError::NoFrameAvailable)?
    }

    /// Re-encode an uploaded image file (any format the `image` crate reads)
    pub fn from_upload(&self, bytes: &[u8]) -> CaptureResult<ImagePayload> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| CaptureError::InvalidImage(e.to_string()))?;
        encode_frame(&img.into_rgba8(), self.quality)
    }

    /// Same as [`Self::from_upload`] for a `data:` URL or bare base64 string
    pub fn from_data_url(&self, data_url: &str) -> CaptureResult<ImagePayload> {
        let bytes = BASE64
            .decode(strip_data_uri(data_url).trim())
            .map_err(|e| CaptureError::InvalidImage(e.to_string()))?;
        self.from_upload(&bytes)
    }
}

/// Encode a raw frame as lossy JPEG and base64 it, without a data-URI header
pub fn encode_frame(frame: &RgbaImage, quality: u8) -> CaptureResult<ImagePayload> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(CaptureError::NoFrameAvailable);
    }

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgba8(frame.clone()).into_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;

    debug!(
        "Encoded {}x{} frame: {} bytes JPEG (q={})",
        width,
        height,
        bytes.len(),
        quality
    );

    Ok(ImagePayload {
        data: BASE64.encode(&bytes),
        mime_type: ImagePayload::JPEG.to_string(),
        width,
        height,
    })
}

/// `data:image/png;base64,AAAA` → `AAAA`. Anything else is returned unchanged.
pub fn strip_data_uri(input: &str) -> &str {
    match input.split_once(',') {
        Some((header, data)) if header.trim_start().starts_with("data:") => data,
        _ => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StillTrack;
    use std::io::Cursor;

    fn test_frame(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]))
    }

    fn decode(payload: &ImagePayload) -> Vec<u8> {
        BASE64.decode(&payload.data).unwrap()
    }

    #[test]
    fn test_encode_frame_is_bare_jpeg() {
        let payload = encode_frame(&test_frame(64, 32), DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!((payload.width, payload.height), (64, 32));
        assert!(!payload.data.starts_with("data:"));

        let bytes = decode(&payload);
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let round = image::load_from_memory(&bytes).unwrap();
        assert_eq!((round.width(), round.height()), (64, 32));
    }

    #[test]
    fn test_empty_frame() {
        assert!(matches!(
            encode_frame(&RgbaImage::new(0, 0), 80),
            Err(CaptureError::NoFrameAvailable)
        ));
    }

    #[test]
    fn test_strip_data_uri() {
        assert_eq!(strip_data_uri("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_uri("QUJD"), "QUJD");
        assert_eq!(strip_data_uri("a,b"), "a,b");
    }

    #[test]
    fn test_upload_png_becomes_jpeg() {
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(test_frame(20, 10))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let data_url = format!("data:image/png;base64,{}", BASE64.encode(&png));

        let sampler = FrameSampler::default();
        let payload = sampler.from_data_url(&data_url).unwrap();
        assert_eq!(payload.mime_type, ImagePayload::JPEG);
        assert_eq!(&decode(&payload)[..2], &[0xFF, 0xD8]);
        assert_eq!((payload.width, payload.height), (20, 10));
    }

    #[test]
    fn test_upload_garbage() {
        let sampler = FrameSampler::default();
        assert!(matches!(
            sampler.from_upload(b"not an image"),
            Err(CaptureError::InvalidImage(_))
        ));
        assert!(matches!(
            sampler.from_data_url("data:image/png;base64,@@@"),
            Err(CaptureError::InvalidImage(_))
        ));
    }

    #[tokio::test]
    async fn test_capture_repeatedly_and_concurrently() {
        let stream = StreamHandle::new(Box::new(StillTrack::new(test_frame(16, 16), "still")));
        let sampler = FrameSampler::new(60);

        let (a, b) = tokio::join!(sampler.capture(&stream), sampler.capture(&stream));
        assert!(a.is_ok() && b.is_ok());
        assert!(sampler.capture(&stream).await.is_ok());
        assert!(stream.is_active());

        stream.stop();
        assert!(matches!(
            sampler.capture(&stream).await,
            Err(CaptureError::NoFrameAvailable)
        ));
    }
}
