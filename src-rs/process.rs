//! Turns a full-viewport bitmap into the stored image for one click: either the element's
//! crop or the whole viewport with a dashed outline around the element.

use crate::dom::{Rect, ScrollOffset};
use crate::error::ProcessingError;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineStyle {
    pub color: Rgba<u8>,
    /// Stroke width in CSS pixels; multiplied by the DPR when drawn.
    pub width: f64,
    pub dash: f64,
    pub gap: f64,
}

impl Default for OutlineStyle {
    fn default() -> Self {
        Self {
            color: Rgba([255, 59, 48, 255]),
            width: 3.0,
            dash: 6.0,
            gap: 4.0,
        }
    }
}

/// Element rect in bitmap pixels, before any clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledRect {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl ScaledRect {
    /// Page rect → viewport rect (minus scroll) → bitmap pixels (times DPR).
    pub fn map(rect: Rect, scroll: ScrollOffset, dpr: f64) -> Result<Self, ProcessingError> {
        if !dpr.is_finite() || dpr <= 0.0 {
            return Err(ProcessingError::InvalidScale(dpr));
        }
        Ok(Self {
            x: ((rect.left - scroll.x) * dpr).round() as i64,
            y: ((rect.top - scroll.y) * dpr).round() as i64,
            w: (rect.width * dpr).round() as i64,
            h: (rect.height * dpr).round() as i64,
        })
    }

    /// Exclusive right edge; saturates for rects far outside any bitmap.
    pub fn right(&self) -> i64 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> i64 {
        self.y.saturating_add(self.h)
    }

    /// True when the rect covers at least one pixel of a `w`x`h` bitmap.
    pub fn intersects(&self, w: u32, h: u32) -> bool {
        self.w > 0
            && self.h > 0
            && self.x < i64::from(w)
            && self.y < i64::from(h)
            && self.right() > 0
            && self.bottom() > 0
    }
}

/// Crop window inside the bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

pub fn source_rect(
    img_w: u32,
    img_h: u32,
    scaled: ScaledRect,
) -> Result<SourceRect, ProcessingError> {
    if img_w == 0 || img_h == 0 {
        return Err(ProcessingError::EmptyBitmap);
    }
    if scaled.w <= 0 || scaled.h <= 0 {
        return Err(ProcessingError::ZeroArea {
            w: scaled.w,
            h: scaled.h,
        });
    }
    if !scaled.intersects(img_w, img_h) {
        return Err(ProcessingError::OutOfBounds);
    }
    let (w, h) = (i64::from(img_w), i64::from(img_h));

    let x = scaled.x.clamp(0, w - 1);
    let y = scaled.y.clamp(0, h - 1);
    let cw = scaled.w.clamp(1, w - x);
    let ch = scaled.h.clamp(1, h - y);

    Ok(SourceRect {
        x: x as u32,
        y: y as u32,
        w: cw as u32,
        h: ch as u32,
    })
}

#[derive(Debug, Clone)]
pub struct Processed {
    pub image: RgbaImage,
    pub cropped: bool,
}

/// Crops when `crop` is set and the rect maps onto the bitmap; anything else yields the
/// full bitmap with an outline.
pub fn process(
    bitmap: &RgbaImage,
    rect: Rect,
    scroll: ScrollOffset,
    dpr: f64,
    crop: bool,
    style: &OutlineStyle,
) -> Processed {
    let scaled = ScaledRect::map(rect, scroll, dpr);

    if crop {
        match scaled.clone().and_then(|s| source_rect(bitmap.width(), bitmap.height(), s)) {
            Ok(src) => {
                let image = image::imageops::crop_imm(bitmap, src.x, src.y, src.w, src.h).to_image();
                return Processed {
                    image,
                    cropped: true,
                };
            }
            Err(err) => log::warn!("crop failed, keeping full viewport with outline: {err}"),
        }
    }

    let mut image = bitmap.clone();
    if let Ok(scaled) = scaled {
        draw_dashed_outline(&mut image, scaled, style, dpr);
    }
    Processed {
        image,
        cropped: false,
    }
}

fn scaled_len(css: f64, dpr: f64) -> u32 {
    ((css * dpr).round() as i64).clamp(1, i64::from(u32::MAX)) as u32
}

/// Dashed border of `scaled`, inset so the whole stroke stays inside the bitmap.
pub fn draw_dashed_outline(img: &mut RgbaImage, scaled: ScaledRect, style: &OutlineStyle, dpr: f64) {
    if !scaled.intersects(img.width(), img.height()) {
        return;
    }
    let stroke = scaled_len(style.width, dpr);
    let dash = scaled_len(style.dash, dpr);
    let period = dash.saturating_add(scaled_len(style.gap, dpr));

    let max_x = i64::from(img.width().saturating_sub(stroke));
    let max_y = i64::from(img.height().saturating_sub(stroke));
    let s = i64::from(stroke);

    let x0 = scaled.x.clamp(0, max_x);
    let y0 = scaled.y.clamp(0, max_y);
    let x1 = scaled.right().saturating_sub(s).clamp(x0, max_x);
    let y1 = scaled.bottom().saturating_sub(s).clamp(y0, max_y);

    for x in x0..=(x1 + s - 1) {
        if (x - x0) as u32 % period >= dash {
            continue;
        }
        for t in 0..s {
            put_inside(img, x, y0 + t, style.color);
            put_inside(img, x, y1 + t, style.color);
        }
    }
    for y in y0..=(y1 + s - 1) {
        if (y - y0) as u32 % period >= dash {
            continue;
        }
        for t in 0..s {
            put_inside(img, x0 + t, y, style.color);
            put_inside(img, x1 + t, y, style.color);
        }
    }
}

fn put_inside(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(img.width()) && y < i64::from(img.height()) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, ProcessingError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|err| ProcessingError::Encode(err.to_string()))?;
    Ok(buf.into_inner())
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, image::ImageError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255]))
    }

    fn no_scroll() -> ScrollOffset {
        ScrollOffset::default()
    }

    #[test]
    fn crop_matches_scaled_element_size() {
        let bitmap = gradient(800, 600);
        let out = process(
            &bitmap,
            Rect::new(100.0, 200.0, 50.0, 20.0),
            no_scroll(),
            2.0,
            true,
            &OutlineStyle::default(),
        );
        assert!(out.cropped);
        assert_eq!(out.image.dimensions(), (100, 40));
        assert_eq!(out.image.get_pixel(0, 0), bitmap.get_pixel(200, 400));
    }

    #[test]
    fn crop_size_rounds_fractional_scale() {
        let bitmap = gradient(1000, 1000);
        let rect = Rect::new(10.0, 10.0, 33.0, 17.0);
        for dpr in [1.0, 1.25, 1.5, 2.0, 3.0] {
            let out = process(&bitmap, rect, no_scroll(), dpr, true, &OutlineStyle::default());
            assert!(out.cropped);
            assert_eq!(
                out.image.dimensions(),
                ((33.0 * dpr).round() as u32, (17.0 * dpr).round() as u32)
            );
        }
    }

    #[test]
    fn scroll_offset_moves_crop_origin() {
        let scaled = ScaledRect::map(
            Rect::new(100.0, 900.0, 10.0, 10.0),
            ScrollOffset { x: 40.0, y: 800.0 },
            2.0,
        )
        .unwrap();
        assert_eq!(scaled, ScaledRect { x: 120, y: 200, w: 20, h: 20 });
        let src = source_rect(640, 480, scaled).unwrap();
        assert_eq!((src.x, src.y, src.w, src.h), (120, 200, 20, 20));
    }

    #[test]
    fn crop_clamps_at_bitmap_edges() {
        let src = source_rect(100, 50, ScaledRect { x: 90, y: -10, w: 40, h: 30 }).unwrap();
        assert_eq!(src, SourceRect { x: 90, y: 0, w: 10, h: 30 });
    }

    #[test]
    fn invalid_crop_parameters_are_reported() {
        assert_eq!(
            source_rect(0, 10, ScaledRect { x: 0, y: 0, w: 1, h: 1 }),
            Err(ProcessingError::EmptyBitmap)
        );
        assert_eq!(
            source_rect(10, 10, ScaledRect { x: 0, y: 0, w: 0, h: 4 }),
            Err(ProcessingError::ZeroArea { w: 0, h: 4 })
        );
        assert_eq!(
            source_rect(10, 10, ScaledRect { x: 20, y: 0, w: 5, h: 5 }),
            Err(ProcessingError::OutOfBounds)
        );
        assert!(matches!(
            ScaledRect::map(Rect::default(), no_scroll(), 0.0),
            Err(ProcessingError::InvalidScale(_))
        ));
    }

    #[test]
    fn unusable_crop_falls_back_to_outline() {
        let bitmap = gradient(200, 100);
        let out = process(
            &bitmap,
            Rect::new(0.0, 5000.0, 10.0, 10.0),
            no_scroll(),
            1.0,
            true,
            &OutlineStyle::default(),
        );
        assert!(!out.cropped);
        // nothing of the element is on screen, so nothing is drawn
        assert_eq!(out.image, bitmap);
    }

    #[test]
    fn huge_rects_saturate_instead_of_overflowing() {
        let bitmap = gradient(100, 100);
        let style = OutlineStyle::default();

        let wide = Rect::new(10.0, 10.0, 1e300, 20.0);
        let out = process(&bitmap, wide, no_scroll(), 1.0, true, &style);
        assert!(out.cropped);
        assert_eq!(out.image.dimensions(), (90, 20));

        let far = Rect::new(1e300, 10.0, 5.0, 5.0);
        let out = process(&bitmap, far, no_scroll(), 1.0, true, &style);
        assert!(!out.cropped);
        assert_eq!(out.image, bitmap);

        let out = process(&bitmap, far, no_scroll(), 1.0, false, &style);
        assert_eq!(out.image, bitmap);

        let out = process(&bitmap, wide, no_scroll(), 1.0, false, &style);
        assert_eq!(*out.image.get_pixel(10, 10), style.color);
    }

    #[test]
    fn outline_mode_keeps_full_frame_and_draws_stroke() {
        let bitmap = RgbaImage::from_pixel(300, 200, Rgba([255, 255, 255, 255]));
        let style = OutlineStyle::default();
        let out = process(
            &bitmap,
            Rect::new(50.0, 40.0, 100.0, 60.0),
            no_scroll(),
            1.0,
            false,
            &style,
        );
        assert!(!out.cropped);
        assert_eq!(out.image.dimensions(), (300, 200));
        // dash starts at the corner
        assert_eq!(*out.image.get_pixel(50, 40), style.color);
        assert_eq!(*out.image.get_pixel(52, 42), style.color);
        // gap after the first dash on the top edge
        assert_eq!(*out.image.get_pixel(57, 40), Rgba([255, 255, 255, 255]));
        // interior untouched
        assert_eq!(*out.image.get_pixel(100, 70), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn outline_is_inset_at_bitmap_edges() {
        let mut img = RgbaImage::from_pixel(40, 30, Rgba([0, 0, 0, 255]));
        let style = OutlineStyle::default();
        draw_dashed_outline(&mut img, ScaledRect { x: -5, y: -5, w: 100, h: 100 }, &style, 1.0);
        assert_eq!(*img.get_pixel(0, 0), style.color);
        assert_eq!(*img.get_pixel(39, 0), style.color);
        assert_eq!(*img.get_pixel(0, 29), style.color);
        assert_eq!(*img.get_pixel(35, 29), style.color);
    }

    #[test]
    fn png_encoding_is_lossless() {
        let img = gradient(17, 9);
        let bytes = encode_png(&img).unwrap();
        assert_eq!(decode_png(&bytes).unwrap(), img);
    }
}
