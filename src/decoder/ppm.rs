//! Binary PPM (P6) frame reader for image2pipe output

use super::error::FrameDecodeError;
use super::frame::{DecodedFrame, PixelFormat};
use tokio::io::{AsyncBufRead, AsyncReadExt};

/// Upper bound on a single dimension; guards against absurd allocations
const MAX_DIMENSION: u32 = 16_384;

pub struct PpmReader<R> {
    inner: R,
}

impl<R: AsyncBufRead + Unpin> PpmReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next frame; `Ok(None)` on a clean end of stream.
    pub async fn next_frame(&mut self) -> Result<Option<DecodedFrame>, FrameDecodeError> {
        let magic = match self.token().await? {
            Some(magic) => magic,
            None => return Ok(None),
        };
        if magic != "P6" {
            return Err(FrameDecodeError::Malformed(format!(
                "expected P6 image, found '{}'",
                magic
            )));
        }

        let width = self.header_number("width").await?;
        let height = self.header_number("height").await?;
        let max_value = self.header_number("maxval").await?;

        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(FrameDecodeError::Malformed(format!(
                "unsupported frame size {}x{}",
                width, height
            )));
        }
        if max_value == 0 || max_value > 255 {
            return Err(FrameDecodeError::Malformed(format!(
                "unsupported PPM maxval {}",
                max_value
            )));
        }

        let mut data = vec![0u8; width as usize * height as usize * 3];
        self.inner.read_exact(&mut data).await.map_err(|e| {
            FrameDecodeError::Malformed(format!("truncated {}x{} raster: {}", width, height, e))
        })?;

        Ok(Some(DecodedFrame::new(width, height, PixelFormat::Rgb24, data)))
    }

    async fn header_number(&mut self, field: &str) -> Result<u32, FrameDecodeError> {
        let token = self.token().await?.ok_or_else(|| {
            FrameDecodeError::Malformed(format!("stream ended before PPM {}", field))
        })?;
        token.parse().map_err(|_| {
            FrameDecodeError::Malformed(format!("invalid PPM {} '{}'", field, token))
        })
    }

    async fn next_byte(&mut self) -> Result<Option<u8>, FrameDecodeError> {
        match self.inner.read_u8().await {
            Ok(byte) => Ok(Some(byte)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(FrameDecodeError::Codec(e.to_string())),
        }
    }

    /// Next whitespace-delimited header token, skipping `#` comments.
    ///
    /// Consumes exactly one whitespace byte after the token, which for the
    /// maxval field is the separator before the raster.
    async fn token(&mut self) -> Result<Option<String>, FrameDecodeError> {
        let first = loop {
            match self.next_byte().await? {
                None => return Ok(None),
                Some(b'#') => loop {
                    match self.next_byte().await? {
                        None => return Ok(None),
                        Some(b'\n') => break,
                        Some(_) => {}
                    }
                },
                Some(b) if b.is_ascii_whitespace() => {}
                Some(b) => break b,
            }
        };

        let mut token = vec![first];
        while let Some(b) = self.next_byte().await? {
            if b.is_ascii_whitespace() {
                break;
            }
            token.push(b);
        }
        Ok(Some(String::from_utf8_lossy(&token).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ppm(width: u32, height: u32, fill: u8) -> Vec<u8> {
        let mut bytes = format!("P6\n{} {}\n255\n", width, height).into_bytes();
        bytes.extend(vec![fill; (width * height * 3) as usize]);
        bytes
    }

    #[tokio::test]
    async fn test_reads_consecutive_frames() {
        let mut input = ppm(4, 2, 10);
        input.extend(ppm(2, 2, 20));
        let mut reader = PpmReader::new(&input[..]);

        let first = reader.next_frame().await.unwrap().unwrap();
        assert_eq!((first.width, first.height), (4, 2));
        assert_eq!(first.data, vec![10; 24]);

        let second = reader.next_frame().await.unwrap().unwrap();
        assert_eq!((second.width, second.height), (2, 2));
        assert_eq!(second.format, PixelFormat::Rgb24);

        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_header_comments_skipped() {
        let mut input = b"P6\n# made by a test\n1 1\n# depth\n255\n".to_vec();
        input.extend([1, 2, 3]);
        let mut reader = PpmReader::new(&input[..]);

        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_rejects_other_formats() {
        let input = b"P3\n1 1\n255\n0 0 0\n".to_vec();
        let mut reader = PpmReader::new(&input[..]);
        assert!(matches!(
            reader.next_frame().await,
            Err(FrameDecodeError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_raster() {
        let mut input = ppm(4, 4, 0);
        input.truncate(input.len() - 5);
        let mut reader = PpmReader::new(&input[..]);
        let err = reader.next_frame().await.unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[tokio::test]
    async fn test_sixteen_bit_rejected() {
        let input = b"P6\n1 1\n65535\n\0\0\0\0\0\0".to_vec();
        let mut reader = PpmReader::new(&input[..]);
        assert!(reader.next_frame().await.is_err());
    }
}
