//! Owned RGB frame buffer and the JPEG codec boundary.
//!
//! Frames are width x height x 3 bytes of RGB8, consistent end to end: the
//! sender encodes RGB to JPEG, the receiver decodes JPEG back to RGB. A frame
//! carries no sequence number; its position in the stream is its arrival
//! order.

use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, GenericImageView};

const CHANNELS: usize = 3;
const JPEG_QUALITY: u8 = 80;

/// One decoded video frame, RGB8.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer size {} does not match {}x{}x{}",
                data.len(),
                width,
                height,
                CHANNELS
            ));
        }
        Ok(Self { data, width, height })
    }

    /// Solid-black frame, mostly useful for tests and stub sources.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; width as usize * height as usize * CHANNELS],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy out the axis-aligned region `[x1, x2) x [y1, y2)`.
    ///
    /// The caller is expected to pass coordinates already clamped to the frame
    /// bounds; anything out of range is clamped again here so a crop can never
    /// read past the buffer.
    pub fn crop(&self, x1: u32, y1: u32, x2: u32, y2: u32) -> Frame {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        let x2 = x2.clamp(x1, self.width);
        let y2 = y2.clamp(y1, self.height);

        let crop_width = (x2 - x1) as usize;
        let mut data = Vec::with_capacity(crop_width * (y2 - y1) as usize * CHANNELS);
        for row in y1..y2 {
            let start = (row as usize * self.width as usize + x1 as usize) * CHANNELS;
            let end = start + crop_width * CHANNELS;
            data.extend_from_slice(&self.data[start..end]);
        }
        Frame {
            data,
            width: x2 - x1,
            height: y2 - y1,
        }
    }
}

/// Encode a frame to JPEG for the wire.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, image::ImageError> {
    let mut payload = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut payload, JPEG_QUALITY);
    encoder.encode(
        frame.data(),
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(payload)
}

/// Decode a JPEG wire payload back into an RGB frame.
pub fn decode_jpeg(payload: &[u8]) -> Result<Frame, image::ImageError> {
    let decoded = image::load_from_memory(payload)?;
    let (width, height) = decoded.dimensions();
    let rgb = decoded.into_rgb8();
    Ok(Frame {
        data: rgb.into_raw(),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer_size() {
        assert!(Frame::new(vec![0u8; 10], 4, 4).is_err());
    }

    #[test]
    fn crop_clamps_to_frame_bounds() {
        let frame = Frame::blank(8, 6);
        let roi = frame.crop(5, 4, 20, 20);
        assert_eq!(roi.width(), 3);
        assert_eq!(roi.height(), 2);
        assert_eq!(roi.data().len(), 3 * 2 * 3);
    }

    #[test]
    fn crop_extracts_expected_pixels() {
        let mut frame = Frame::blank(4, 4);
        // Mark pixel (2, 1).
        let offset = (1 * 4 + 2) * 3;
        frame.data_mut()[offset] = 200;

        let roi = frame.crop(2, 1, 3, 2);
        assert_eq!(roi.width(), 1);
        assert_eq!(roi.height(), 1);
        assert_eq!(roi.data()[0], 200);
    }

    #[test]
    fn jpeg_round_trip_preserves_dimensions() {
        let frame = Frame::blank(32, 24);
        let payload = encode_jpeg(&frame).unwrap();
        let decoded = decode_jpeg(&payload).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
        assert_eq!(decoded.data().len(), 32 * 24 * 3);
    }
}
