//! Bounding-box mapping and crop extraction.
//!
//! Detector boxes are `[y0, x0, y1, x1]` in raster pixels. Conversion to a
//! crop happens exactly once, here, with explicit clamping; boxes that
//! collapse after clamping are rejected.

use std::io::Cursor;

use anyhow::{Context, Result};
use image::ImageFormat;

use crate::content::RegionBox;

/// A pixel box clamped to image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub y0: u32,
    pub x0: u32,
    pub y1: u32,
    pub x1: u32,
}

impl PixelBox {
    pub fn to_region_box(self) -> RegionBox {
        RegionBox {
            y0: self.y0 as f64,
            x0: self.x0 as f64,
            y1: self.y1 as f64,
            x1: self.x1 as f64,
        }
    }
}

/// Clamp `[y0, x0, y1, x1]` to the image and reject degenerate results.
pub fn clamp_box(box_2d: [f64; 4], width: u32, height: u32) -> Option<PixelBox> {
    if width == 0 || height == 0 {
        return None;
    }
    let clamp = |v: f64, max: u32| -> u32 { (v.max(0.0) as i64).min(max as i64).max(0) as u32 };
    let boxed = PixelBox {
        y0: clamp(box_2d[0], height.saturating_sub(1)),
        x0: clamp(box_2d[1], width.saturating_sub(1)),
        y1: clamp(box_2d[2], height),
        x1: clamp(box_2d[3], width),
    };
    if boxed.y0 >= boxed.y1 || boxed.x0 >= boxed.x1 {
        tracing::warn!(?box_2d, width, height, "Rejecting degenerate box after clamp");
        return None;
    }
    Some(boxed)
}

/// Crop a PNG page raster to the clamped box, returning PNG bytes.
pub fn crop_png(image_bytes: &[u8], boxed: PixelBox) -> Result<Vec<u8>> {
    let image = image::load_from_memory(image_bytes).context("Failed to decode page raster")?;
    let crop = image.crop_imm(boxed.x0, boxed.y0, boxed.x1 - boxed.x0, boxed.y1 - boxed.y0);
    let mut out = Cursor::new(Vec::new());
    crop.write_to(&mut out, ImageFormat::Png)
        .context("Failed to encode crop as PNG")?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn test_png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn in_bounds_box_is_unchanged() {
        let boxed = clamp_box([10.0, 20.0, 50.0, 80.0], 100, 100).unwrap();
        assert_eq!(boxed, PixelBox { y0: 10, x0: 20, y1: 50, x1: 80 });
    }

    #[test]
    fn out_of_bounds_box_is_clamped() {
        let boxed = clamp_box([-5.0, -5.0, 500.0, 500.0], 100, 60).unwrap();
        assert_eq!(boxed, PixelBox { y0: 0, x0: 0, y1: 60, x1: 100 });
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        assert!(clamp_box([50.0, 10.0, 50.0, 20.0], 100, 100).is_none());
        assert!(clamp_box([10.0, 50.0, 20.0, 50.0], 100, 100).is_none());
        assert!(clamp_box([90.0, 10.0, 20.0, 20.0], 100, 100).is_none());
        assert!(clamp_box([0.0, 0.0, 10.0, 10.0], 0, 0).is_none());
    }

    #[test]
    fn fully_outside_box_is_rejected() {
        assert!(clamp_box([200.0, 200.0, 300.0, 300.0], 100, 100).is_none());
    }

    #[test]
    fn crop_produces_decodable_png_of_expected_size() {
        let png = test_png(100, 80);
        let boxed = clamp_box([10.0, 20.0, 50.0, 70.0], 100, 80).unwrap();
        let crop = crop_png(&png, boxed).unwrap();
        let decoded = image::load_from_memory(&crop).unwrap();
        assert_eq!(decoded.width(), 50);
        assert_eq!(decoded.height(), 40);
    }

    #[test]
    fn crop_rejects_non_image_bytes() {
        let boxed = PixelBox { y0: 0, x0: 0, y1: 1, x1: 1 };
        assert!(crop_png(b"not a png", boxed).is_err());
    }
}
