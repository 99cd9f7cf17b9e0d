use chrono::Utc;

use crate::config::CanvasConfig;
use crate::palette::Palette;
use crate::state::{CanvasSnapshot, PixelOp};

/// How the pipeline treats an opaque pixel whose RGB has no exact palette
/// match.
///
/// `Strict` is the default: the whole upload is rejected at the first
/// offending pixel and nothing is installed. `NearestMatch` is an
/// explicitly-opted-in relaxation that substitutes the closest palette
/// color and keeps scanning; it silently changes uploader intent, so it is
/// never the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantizeMode {
    #[default]
    Strict,
    NearestMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The bytes are not decodable image data.
    #[error("image decode failed: {0}")]
    Decode(String),
    /// The bitmap does not match the configured canvas geometry.
    #[error("expected a {expected_width}x{expected_height} canvas, got {len} bytes")]
    BadGeometry {
        expected_width: u32,
        expected_height: u32,
        len: usize,
    },
    /// First opaque pixel with no exact palette match, strict mode only.
    #[error("pixel at {x}, {y} has an invalid color ({r}, {g}, {b}, {a})")]
    BadColor {
        x: u32,
        y: u32,
        r: u8,
        g: u8,
        b: u8,
        a: u8,
    },
}

/// Scans a raw RGBA buffer into a validated, palette-quantized snapshot.
///
/// Pure with respect to canvas state: the caller performs the atomic swap.
/// Pixels are visited in row-major order; a pixel with alpha below 255 is
/// "no operation" and contributes nothing to the order list. All-or-nothing:
/// any failure leaves no partial result behind.
pub fn ingest_rgba(
    raw: &[u8],
    config: &CanvasConfig,
    palette: &Palette,
) -> Result<CanvasSnapshot, IngestError> {
    if raw.len() != config.rgba_len() {
        return Err(IngestError::BadGeometry {
            expected_width: config.width,
            expected_height: config.height,
            len: raw.len(),
        });
    }

    let mut orders = Vec::new();
    for (i, px) in raw.chunks_exact(4).enumerate() {
        let (r, g, b, a) = (px[0], px[1], px[2], px[3]);
        if a != 255 {
            continue;
        }
        let x = i as u32 % config.width;
        let y = i as u32 / config.width;
        let resolved = match config.quantize {
            QuantizeMode::Strict => palette.resolve_exact([r, g, b]),
            QuantizeMode::NearestMatch => palette
                .resolve_exact([r, g, b])
                .or_else(|| palette.resolve_nearest([r, g, b])),
        };
        let color = match resolved {
            Some(color) => color,
            None => return Err(IngestError::BadColor { x, y, r, g, b, a }),
        };
        orders.push(PixelOp { x, y, color });
    }

    Ok(CanvasSnapshot {
        map_id: fresh_map_id(),
        orders,
    })
}

/// Decodes an uploaded PNG and ingests it.
pub fn ingest_png(
    bytes: &[u8],
    config: &CanvasConfig,
    palette: &Palette,
) -> Result<CanvasSnapshot, IngestError> {
    let image =
        image::load_from_memory(bytes).map_err(|e| IngestError::Decode(e.to_string()))?;
    if image.width() != config.width || image.height() != config.height {
        return Err(IngestError::BadGeometry {
            expected_width: config.width,
            expected_height: config.height,
            len: image.width() as usize * image.height() as usize * 4,
        });
    }
    // An alpha-less source reads as fully opaque.
    let rgba = image.to_rgba8();
    ingest_rgba(rgba.as_raw(), config, palette)
}

/// Map ids are derived from the ingestion timestamp; to the core they are
/// opaque, collaborators conventionally use them as file names.
fn fresh_map_id() -> String {
    format!("{}.png", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_2x2() -> CanvasConfig {
        CanvasConfig {
            width: 2,
            height: 2,
            ..CanvasConfig::default()
        }
    }

    fn rgba(pixels: &[[u8; 4]]) -> Vec<u8> {
        pixels.iter().flatten().copied().collect()
    }

    #[test]
    fn rejects_wrong_byte_length() {
        let config = config_2x2();
        let err = ingest_rgba(&[0u8; 7], &config, &Palette::place_2022()).unwrap_err();
        assert_eq!(
            err,
            IngestError::BadGeometry {
                expected_width: 2,
                expected_height: 2,
                len: 7,
            }
        );
    }

    #[test]
    fn aborts_whole_image_on_first_bad_color() {
        // (0,0) dark red opaque, (1,0) transparent, (0,1) off-palette
        // opaque, (1,1) orange opaque.
        let raw = rgba(&[
            [0xBE, 0x00, 0x39, 255],
            [0, 0, 0, 0],
            [1, 2, 3, 255],
            [0xFF, 0x45, 0x00, 255],
        ]);
        let err = ingest_rgba(&raw, &config_2x2(), &Palette::place_2022()).unwrap_err();
        assert_eq!(
            err,
            IngestError::BadColor {
                x: 0,
                y: 1,
                r: 1,
                g: 2,
                b: 3,
                a: 255,
            }
        );
    }

    #[test]
    fn transparent_pixels_contribute_no_orders() {
        let raw = rgba(&[
            [0xBE, 0x00, 0x39, 255],
            [0, 0, 0, 0],
            [1, 2, 3, 128], // off-palette but not opaque: skipped
            [0xFF, 0x45, 0x00, 255],
        ]);
        let snapshot = ingest_rgba(&raw, &config_2x2(), &Palette::place_2022()).unwrap();
        assert_eq!(
            snapshot.orders,
            vec![
                PixelOp { x: 0, y: 0, color: 1 },
                PixelOp { x: 1, y: 1, color: 2 },
            ]
        );
    }

    #[test]
    fn orders_come_out_in_row_major_order() {
        let white = [0xFF, 0xFF, 0xFF, 255];
        let raw = rgba(&[white, white, white, white]);
        let snapshot = ingest_rgba(&raw, &config_2x2(), &Palette::place_2022()).unwrap();
        let coords: Vec<(u32, u32)> =
            snapshot.orders.iter().map(|op| (op.x, op.y)).collect();
        assert_eq!(coords, [(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert!(snapshot.orders.iter().all(|op| op.color == 31));
    }

    #[test]
    fn nearest_match_mode_corrects_instead_of_failing() {
        let config = CanvasConfig {
            quantize: QuantizeMode::NearestMatch,
            ..config_2x2()
        };
        let raw = rgba(&[
            [1, 2, 3, 255], // near black
            [0xFE, 0xFE, 0xFE, 255], // near white
            [0, 0, 0, 0],
            [0, 0, 0, 0],
        ]);
        let snapshot = ingest_rgba(&raw, &config, &Palette::place_2022()).unwrap();
        assert_eq!(
            snapshot.orders,
            vec![
                PixelOp { x: 0, y: 0, color: 27 },
                PixelOp { x: 1, y: 0, color: 31 },
            ]
        );
    }

    #[test]
    fn png_path_decodes_and_validates() {
        use image::{ImageBuffer, Rgba};

        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(2, 2, Rgba([0x00, 0x00, 0x00, 255]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();

        let snapshot = ingest_png(&bytes, &config_2x2(), &Palette::place_2022()).unwrap();
        assert_eq!(snapshot.order_count(), 4);
        assert!(snapshot.orders.iter().all(|op| op.color == 27));

        // Same bytes against a bigger canvas: geometry failure.
        let big = CanvasConfig {
            width: 4,
            height: 4,
            ..CanvasConfig::default()
        };
        assert!(matches!(
            ingest_png(&bytes, &big, &Palette::place_2022()),
            Err(IngestError::BadGeometry { .. })
        ));
    }

    #[test]
    fn garbage_bytes_are_a_decode_failure() {
        assert!(matches!(
            ingest_png(b"not a png", &config_2x2(), &Palette::place_2022()),
            Err(IngestError::Decode(_))
        ));
    }
}
