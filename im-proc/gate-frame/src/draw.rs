//! Result-overlay drawing on [`BgrFrame`]s.
//!
//! Everything clips to the frame, so callers can pass track points near the
//! border without pre-checking.

use gate_types::{Point, Rect};
use rusttype::{point, Font, Scale};

use crate::BgrFrame;

/// Colors are packed blue-green-red, matching the frame layout.
pub type Bgr = [u8; 3];

pub const GREEN: Bgr = [0, 255, 0];
pub const RED: Bgr = [0, 0, 255];
pub const BLUE: Bgr = [255, 0, 0];
pub const YELLOW: Bgr = [0, 255, 255];

fn put_pixel(frame: &mut BgrFrame, x: i32, y: i32, color: Bgr) {
    if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.set_bgr(x as u32, y as u32, color);
    }
}

/// Full-width horizontal line centered on `y`.
pub fn hline(frame: &mut BgrFrame, y: i32, thickness: i32, color: Bgr) {
    for dy in 0..thickness {
        let row = y + dy - thickness / 2;
        for x in 0..frame.width() as i32 {
            put_pixel(frame, x, row, color);
        }
    }
}

pub fn segment(frame: &mut BgrFrame, a: Point, b: Point, color: Bgr) {
    // Bresenham.
    let (mut x, mut y) = (a.x, a.y);
    let dx = (b.x - a.x).abs();
    let dy = -(b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel(frame, x, y, color);
        if x == b.x && y == b.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

pub fn polyline(frame: &mut BgrFrame, points: &[Point], color: Bgr) {
    for pair in points.windows(2) {
        segment(frame, pair[0], pair[1], color);
    }
}

pub fn rect_outline(frame: &mut BgrFrame, rect: Rect, thickness: i32, color: Bgr) {
    for t in 0..thickness {
        let (x0, y0) = (rect.x - t, rect.y - t);
        let (x1, y1) = (rect.x + rect.width + t, rect.y + rect.height + t);
        for x in x0..=x1 {
            put_pixel(frame, x, y0, color);
            put_pixel(frame, x, y1, color);
        }
        for y in y0..=y1 {
            put_pixel(frame, x0, y, color);
            put_pixel(frame, x1, y, color);
        }
    }
}

/// The bundled monospace face used for the FPS stamp.
pub fn default_font() -> Font<'static> {
    // The embedded face is known good, so the parse cannot fail.
    Font::try_from_bytes(ttf_firacode::REGULAR).expect("parse embedded font")
}

/// Draw `text` with its top-left near `origin`, alpha-blending glyph
/// coverage over the frame.
pub fn stamp_text(frame: &mut BgrFrame, font: &Font<'_>, text: &str, origin: Point, color: Bgr) {
    let scale = Scale::uniform(28.0);
    let v_metrics = font.v_metrics(scale);
    let glyphs: Vec<_> = font
        .layout(
            text,
            scale,
            point(origin.x as f32, origin.y as f32 + v_metrics.ascent),
        )
        .collect();

    for glyph in glyphs {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let x = gx as i32 + bb.min.x;
                let y = gy as i32 + bb.min.y;
                if x < 0 || y < 0 || x >= frame.width() as i32 || y >= frame.height() as i32 {
                    return;
                }
                let old = frame.bgr(x as u32, y as u32);
                let mut new = [0u8; 3];
                for c in 0..3 {
                    new[c] = (old[c] as f32 * (1.0 - coverage) + color[c] as f32 * coverage)
                        .round() as u8;
                }
                frame.set_bgr(x as u32, y as u32, new);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hline_clips_and_paints() {
        let mut f = BgrFrame::black(0, 8, 8);
        hline(&mut f, 0, 3, GREEN);
        assert_eq!(f.bgr(3, 0), GREEN);
        assert_eq!(f.bgr(3, 1), GREEN);
        assert_eq!(f.bgr(3, 2), [0, 0, 0]);
    }

    #[test]
    fn segment_endpoints() {
        let mut f = BgrFrame::black(0, 10, 10);
        segment(&mut f, Point::new(1, 1), Point::new(8, 5), RED);
        assert_eq!(f.bgr(1, 1), RED);
        assert_eq!(f.bgr(8, 5), RED);
    }

    #[test]
    fn rect_outline_does_not_fill() {
        let mut f = BgrFrame::black(0, 16, 16);
        rect_outline(&mut f, Rect::new(4, 4, 6, 6), 1, BLUE);
        assert_eq!(f.bgr(4, 4), BLUE);
        assert_eq!(f.bgr(10, 10), BLUE);
        assert_eq!(f.bgr(7, 7), [0, 0, 0]);
    }

    #[test]
    fn text_stamps_pixels() {
        let mut f = BgrFrame::black(0, 200, 60);
        let font = default_font();
        stamp_text(&mut f, &font, "FPS : 30.00", Point::new(10, 10), GREEN);
        let painted = (0..60u32)
            .flat_map(|y| (0..200u32).map(move |x| (x, y)))
            .filter(|&(x, y)| f.bgr(x, y) != [0, 0, 0])
            .count();
        assert!(painted > 50, "expected glyph coverage, got {painted}");
    }
}
