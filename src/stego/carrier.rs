//! Carrier images.
//!
//! A carrier is decoded once into 8-bit RGB (or RGBA when the source has
//! alpha). Only the three colour channels hold payload bits; alpha is
//! left untouched. Output is always written in a lossless format, since
//! any re-encoding that perturbs pixel values destroys the payload.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, RgbaImage};

use crate::error::{FractureError, FractureResult};
use crate::secure_fs;

/// Channels per pixel that carry payload bits
pub const COLOR_CHANNELS: usize = 3;

/// Formats whose encoders preserve every pixel value
pub fn is_lossless(format: ImageFormat) -> bool {
    matches!(format, ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tiff)
}

/// Output format for `path`, refusing anything that is not lossless
pub fn output_format(path: &Path) -> FractureResult<ImageFormat> {
    let format = ImageFormat::from_path(path).map_err(|_| {
        FractureError::LossyFormat(format!("cannot tell image format of {}", path.display()))
    })?;

    if !is_lossless(format) {
        return Err(FractureError::LossyFormat(format!(
            "{:?} output would destroy the payload of {}; use PNG, BMP or TIFF",
            format,
            path.display()
        )));
    }
    Ok(format)
}

/// Decoded pixel storage
#[derive(Clone)]
pub struct Carrier {
    width: u32,
    height: u32,
    /// Bytes per pixel in `pixels` (3 or 4)
    stride: usize,
    pixels: Vec<u8>,
    source_format: Option<ImageFormat>,
}

impl Carrier {
    /// Wrap an in-memory image
    pub fn from_image(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());

        let (stride, pixels) = if image.color().has_alpha() {
            (4, image.into_rgba8().into_raw())
        } else {
            (3, image.into_rgb8().into_raw())
        };

        Self {
            width,
            height,
            stride,
            pixels,
            source_format: None,
        }
    }

    /// Load a carrier from disk
    pub fn open(path: &Path) -> FractureResult<Self> {
        let bytes = secure_fs::read_file(path)?;
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader.format();
        let image = reader.decode()?;

        if let Some(format) = format {
            if !is_lossless(format) {
                tracing::warn!(
                    "carrier {} is {:?}; it will be re-encoded losslessly",
                    path.display(),
                    format
                );
            }
        }

        let mut carrier = Self::from_image(image);
        carrier.source_format = format;
        Ok(carrier)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_alpha(&self) -> bool {
        self.stride == 4
    }

    /// Format the carrier was decoded from, if it came from a file
    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    /// Number of colour channel samples
    pub(crate) fn sample_count(&self) -> usize {
        self.width as usize * self.height as usize * COLOR_CHANNELS
    }

    /// Byte offset of colour sample `n` in row-major, channel-major order
    #[inline]
    fn offset(&self, n: usize) -> usize {
        (n / COLOR_CHANNELS) * self.stride + n % COLOR_CHANNELS
    }

    #[inline]
    pub(crate) fn sample(&self, n: usize) -> u8 {
        self.pixels[self.offset(n)]
    }

    #[inline]
    pub(crate) fn sample_mut(&mut self, n: usize) -> &mut u8 {
        let offset = self.offset(n);
        &mut self.pixels[offset]
    }

    /// Back to an `image` value
    pub fn to_image(&self) -> FractureResult<DynamicImage> {
        let invalid = || FractureError::Image("pixel buffer does not match dimensions".into());

        if self.has_alpha() {
            RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(invalid)
        } else {
            RgbImage::from_raw(self.width, self.height, self.pixels.clone())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid)
        }
    }

    /// Encode into `format`, which must be lossless
    pub fn encode(&self, format: ImageFormat) -> FractureResult<Vec<u8>> {
        if !is_lossless(format) {
            return Err(FractureError::LossyFormat(format!("{:?}", format)));
        }

        let mut out = Cursor::new(Vec::new());
        self.to_image()?.write_to(&mut out, format)?;
        Ok(out.into_inner())
    }

    /// Encode for `path` and write it atomically
    pub fn save(&self, path: &Path) -> FractureResult<()> {
        let format = output_format(path)?;
        let encoded = self.encode(format)?;
        secure_fs::write_atomic(path, &encoded)
    }
}

impl std::fmt::Debug for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Carrier")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("alpha", &self.has_alpha())
            .field("source_format", &self.source_format)
            .finish()
    }
}
