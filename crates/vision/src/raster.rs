//! Rasterization of predictions into annotated previews and masks.

use gridsweep_core::color::{bank_color, BOX_OUTLINE};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut, Canvas,
};
use imageproc::point::Point;
use imageproc::rect::Rect;

use crate::backend::Predictions;
use crate::font;

const MASK_ON: Luma<u8> = Luma([255]);
const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

/// Vertical offset of the label row above a box's top edge.
const LABEL_RISE: i32 = 12;

/// Alpha (out of 255) for translucent polygon fills.
const FILL_ALPHA: u32 = 180;

// ---------------------------------------------------------------------------
// Mask-select filter
// ---------------------------------------------------------------------------

/// Parse the mask-select input into its comma-separated terms.
pub fn parse_mask_select(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// An empty filter passes everything; otherwise a region passes when
/// its index or its label appears among the terms.
pub fn filter_hit(filter: &[String], index: usize, label: &str) -> bool {
    filter.is_empty()
        || filter
            .iter()
            .any(|term| term == label || term.parse() == Ok(index))
}

// ---------------------------------------------------------------------------
// Bbox mode
// ---------------------------------------------------------------------------

/// Draw every predicted box on a copy of the image and build the mask.
///
/// Boxes are clamped into bounds and normalized so x0<=x1, y0<=y1.
/// The mask is filled only for regions passing the filter, and only
/// when `fill_mask` is set; otherwise it stays all zero.
pub fn annotate_bboxes(
    image: &RgbImage,
    predictions: &Predictions,
    fill_mask: bool,
    filter: &[String],
) -> (RgbImage, GrayImage) {
    let mut annotated = image.clone();
    let mut mask = GrayImage::new(image.width(), image.height());
    let (w, h) = (image.width() as i32, image.height() as i32);

    for (index, (bbox, label)) in predictions
        .bboxes
        .iter()
        .zip(predictions.labels.iter())
        .enumerate()
    {
        let x0 = (bbox[0].min(bbox[2]) as i32).clamp(0, w - 1);
        let y0 = (bbox[1].min(bbox[3]) as i32).clamp(0, h - 1);
        let x1 = (bbox[0].max(bbox[2]) as i32).clamp(0, w - 1);
        let y1 = (bbox[1].max(bbox[3]) as i32).clamp(0, h - 1);
        let rect = Rect::at(x0, y0).of_size((x1 - x0).max(1) as u32, (y1 - y0).max(1) as u32);

        if fill_mask && filter_hit(filter, index, label) {
            draw_filled_rect_mut(&mut mask, rect, MASK_ON);
        }

        draw_hollow_rect_mut(&mut annotated, rect, BOX_OUTLINE);
        draw_label(&mut annotated, x0, y0, index, label);
    }

    (annotated, mask)
}

/// `"{index}.{label}"` on a half-blended color chip above the box.
fn draw_label(img: &mut RgbImage, x0: i32, y0: i32, index: usize, label: &str) {
    let text = format!("{index}.{label}");
    let y = (y0 - LABEL_RISE).max(0);
    let chip = bank_color(index);
    blend_rect(
        img,
        x0,
        y - 1,
        font::text_width(&text) + 2,
        font::GLYPH_HEIGHT + 2,
        chip,
        128,
    );
    font::draw_text(img, x0 + 1, y, &text, LABEL_TEXT);
}

/// Blend `color` over a rectangle at `alpha`/255 opacity, clipped.
fn blend_rect(img: &mut RgbImage, x: i32, y: i32, w: u32, h: u32, color: Rgb<u8>, alpha: u32) {
    let (iw, ih) = (img.width() as i32, img.height() as i32);
    for dy in 0..h as i32 {
        for dx in 0..w as i32 {
            let (px, py) = (x + dx, y + dy);
            if px < 0 || px >= iw || py < 0 || py >= ih {
                continue;
            }
            let p = img.get_pixel_mut(px as u32, py as u32);
            for c in 0..3 {
                let mixed = (p.0[c] as u32 * (255 - alpha) + color.0[c] as u32 * alpha) / 255;
                p.0[c] = mixed as u8;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Polygon mode
// ---------------------------------------------------------------------------

/// Draw polygon outlines (plus translucent fills when `fill_mask`) and
/// build the interior mask.
///
/// Points are clamped into bounds; rings with fewer than three points
/// are skipped. The mask is always filled for every drawn ring; only
/// the preview styling changes with `fill_mask`.
pub fn annotate_polygons(
    image: &RgbImage,
    predictions: &Predictions,
    fill_mask: bool,
) -> (RgbImage, GrayImage) {
    let mut annotated = image.clone();
    let mut mask = GrayImage::new(image.width(), image.height());
    let (w, h) = (image.width() as i32, image.height() as i32);

    for (group_index, group) in predictions.polygons.iter().enumerate() {
        let color = bank_color(group_index);
        for ring in group {
            let points = clamp_ring(ring, w, h);
            if points.len() < 3 {
                tracing::debug!(points = ring.len(), "Skipping degenerate polygon");
                continue;
            }

            if fill_mask {
                blend_polygon(&mut annotated, &points, color, FILL_ALPHA);
            }
            draw_ring_outline(&mut annotated, &points, color);
            draw_polygon_mut(&mut mask, &points, MASK_ON);
            draw_ring_outline(&mut mask, &points, MASK_ON);
        }
    }

    (annotated, mask)
}

/// Clamp a ring into image bounds, dropping a duplicated closing point.
fn clamp_ring(ring: &[[f32; 2]], w: i32, h: i32) -> Vec<Point<i32>> {
    let mut points: Vec<Point<i32>> = ring
        .iter()
        .map(|p| {
            Point::new(
                (p[0] as i32).clamp(0, w - 1),
                (p[1] as i32).clamp(0, h - 1),
            )
        })
        .collect();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

fn draw_ring_outline<C: Canvas>(canvas: &mut C, points: &[Point<i32>], color: C::Pixel) {
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            canvas,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            color,
        );
    }
}

/// Translucent interior fill via a scratch coverage mask.
fn blend_polygon(img: &mut RgbImage, points: &[Point<i32>], color: Rgb<u8>, alpha: u32) {
    let mut coverage = GrayImage::new(img.width(), img.height());
    draw_polygon_mut(&mut coverage, points, MASK_ON);
    for (x, y, pixel) in coverage.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        let p = img.get_pixel_mut(x, y);
        for c in 0..3 {
            let mixed = (p.0[c] as u32 * (255 - alpha) + color.0[c] as u32 * alpha) / 255;
            p.0[c] = mixed as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox_preds() -> Predictions {
        Predictions {
            bboxes: vec![[4.0, 4.0, 20.0, 20.0], [40.0, 40.0, 60.0, 60.0]],
            labels: vec!["cat".into(), "dog".into()],
            polygons: Vec::new(),
        }
    }

    #[test]
    fn filter_matches_index_or_label() {
        let filter = parse_mask_select(" 0, dog ,");
        assert!(filter_hit(&filter, 0, "cat"));
        assert!(filter_hit(&filter, 5, "dog"));
        assert!(!filter_hit(&filter, 1, "bird"));
        assert!(filter_hit(&[], 9, "anything"));
    }

    #[test]
    fn bbox_mask_respects_filter_and_fill_flag() {
        let image = RgbImage::from_pixel(64, 64, Rgb([10, 10, 10]));
        let filter = parse_mask_select("cat");

        let (_, mask) = annotate_bboxes(&image, &bbox_preds(), true, &filter);
        assert_eq!(mask.get_pixel(10, 10).0[0], 255);
        assert_eq!(mask.get_pixel(50, 50).0[0], 0);

        let (_, mask) = annotate_bboxes(&image, &bbox_preds(), false, &[]);
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn bbox_coordinates_clamp_and_normalize() {
        let image = RgbImage::new(32, 32);
        let preds = Predictions {
            // Reversed corners and out-of-bounds extent.
            bboxes: vec![[500.0, 28.0, 8.0, -5.0]],
            labels: vec!["x".into()],
            polygons: Vec::new(),
        };
        let (annotated, mask) = annotate_bboxes(&image, &preds, true, &[]);
        assert_eq!(annotated.dimensions(), (32, 32));
        assert_eq!(mask.get_pixel(16, 16).0[0], 255);
    }

    #[test]
    fn polygon_interiors_fill_the_mask() {
        let image = RgbImage::from_pixel(64, 64, Rgb([200, 0, 0]));
        let preds = Predictions {
            polygons: vec![vec![vec![
                [16.0, 16.0],
                [48.0, 16.0],
                [48.0, 48.0],
                [16.0, 48.0],
            ]]],
            labels: vec!["square".into()],
            bboxes: Vec::new(),
        };
        let (annotated, mask) = annotate_polygons(&image, &preds, true);
        assert_eq!(mask.get_pixel(32, 32).0[0], 255);
        assert_eq!(mask.get_pixel(2, 2).0[0], 0);
        // The translucent fill changed the preview inside the ring.
        assert_ne!(annotated.get_pixel(32, 32).0, [200, 0, 0]);
        assert_eq!(annotated.get_pixel(2, 2).0, [200, 0, 0]);
    }

    #[test]
    fn degenerate_polygons_are_skipped() {
        let image = RgbImage::new(32, 32);
        let preds = Predictions {
            polygons: vec![vec![vec![[4.0, 4.0], [20.0, 20.0]]]],
            labels: vec!["line".into()],
            bboxes: Vec::new(),
        };
        let (annotated, mask) = annotate_polygons(&image, &preds, true);
        assert!(mask.pixels().all(|p| p.0[0] == 0));
        assert!(annotated.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn outline_only_when_fill_disabled() {
        let image = RgbImage::from_pixel(64, 64, Rgb([200, 0, 0]));
        let preds = Predictions {
            polygons: vec![vec![vec![
                [16.0, 16.0],
                [48.0, 16.0],
                [48.0, 48.0],
                [16.0, 48.0],
            ]]],
            labels: vec!["square".into()],
            bboxes: Vec::new(),
        };
        let (annotated, mask) = annotate_polygons(&image, &preds, false);
        // Interior pixels keep the source color; the mask still fills.
        assert_eq!(annotated.get_pixel(32, 32).0, [200, 0, 0]);
        assert_eq!(mask.get_pixel(32, 32).0[0], 255);
    }
}
