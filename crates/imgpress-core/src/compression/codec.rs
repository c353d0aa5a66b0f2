//! Image decoding and format-specific encoding.
//!
//! Encoder settings per format:
//!
//! - **JPEG**: quality is passed straight to the baseline encoder; alpha is
//!   dropped.
//! - **PNG**: lossless, so quality selects the deflate effort instead (lower
//!   quality spends more time for a smaller file).
//! - **WebP**: the bundled encoder is lossless only; size reduction comes
//!   from the strategy's resize.

use crate::{Error, OutputFormat, Quality, Result};
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
        webp::WebPEncoder,
    },
};

/// Decodes any supported image format, guessing it from the content.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| Error::Decode {
        context: e.to_string(),
    })
}

/// Encodes `image` into `format`.
pub fn encode(image: &DynamicImage, format: OutputFormat, quality: Quality) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let (width, height) = (image.width(), image.height());

    let written = match format {
        OutputFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality.get()).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buf,
                png_compression(quality),
                FilterType::Adaptive,
            );
            write_rgb_or_rgba(encoder, image)
        }
        OutputFormat::WebP => write_rgb_or_rgba(WebPEncoder::new_lossless(&mut buf), image),
    };

    written.map_err(|e| Error::Encode {
        context: format!("{format}: {e}"),
    })?;
    Ok(buf)
}

fn png_compression(quality: Quality) -> CompressionType {
    match quality.get() {
        0..50 => CompressionType::Best,
        50..90 => CompressionType::Default,
        _ => CompressionType::Fast,
    }
}

fn write_rgb_or_rgba<E: ImageEncoder>(encoder: E, image: &DynamicImage) -> image::ImageResult<()> {
    let (width, height) = (image.width(), image.height());
    if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        encoder.write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
    } else {
        let rgb = image.to_rgb8();
        encoder.write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }))
    }

    #[test]
    fn every_format_decodes_back_with_same_dimensions() {
        let source = gradient(48, 32);
        for format in [OutputFormat::WebP, OutputFormat::Jpeg, OutputFormat::Png] {
            let bytes = encode(&source, format, Quality::new(70).unwrap()).unwrap();
            let decoded = decode(&bytes).unwrap();
            assert_eq!(decoded.dimensions(), (48, 32), "format {format}");
        }
    }

    #[test]
    fn encoded_bytes_carry_the_requested_container() {
        let source = gradient(16, 16);
        let cases = [
            (OutputFormat::WebP, ImageFormat::WebP),
            (OutputFormat::Jpeg, ImageFormat::Jpeg),
            (OutputFormat::Png, ImageFormat::Png),
        ];
        for (format, expected) in cases {
            let bytes = encode(&source, format, Quality::MAX).unwrap();
            assert_eq!(image::guess_format(&bytes).unwrap(), expected);
        }
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert_eq!(err.kind(), "decode");
    }
}
