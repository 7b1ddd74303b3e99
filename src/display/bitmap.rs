use crate::decoder::{DecodedFrame, PixelFormat};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameConvertError {
    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("{width}x{height} frame carries {actual} bytes, expected {expected}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// RGBA8 pixels ready to hand to a surface
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    pub fn from_frame(frame: &DecodedFrame) -> Result<Self, FrameConvertError> {
        let (width, height) = (frame.width, frame.height);
        if width == 0 || height == 0 {
            return Err(FrameConvertError::EmptyFrame { width, height });
        }

        let expected = frame.expected_len();
        if frame.data.len() != expected {
            return Err(FrameConvertError::SizeMismatch {
                width,
                height,
                expected,
                actual: frame.data.len(),
            });
        }

        let pixels = match frame.format {
            PixelFormat::Rgba32 => frame.data.clone(),
            PixelFormat::Rgb24 => {
                let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
                for rgb in frame.data.chunks_exact(3) {
                    pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 0xFF]);
                }
                pixels
            }
        };

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bitmap({}x{})", self.width, self.height)
    }
}
