//! Result-overlay composition: mid-line, primary target box, track
//! polyline, crossing flash and the FPS stamp.

use rusttype::Font;

use gate_frame::{draw, BgrFrame};
use gate_tracker::Tracker;
use gate_types::Point;

pub fn compose(
    frame: &BgrFrame,
    tracker: &Tracker,
    fired: bool,
    mid_y: i32,
    fps: f64,
    font: &Font<'_>,
) -> BgrFrame {
    let mut out = frame.clone();
    draw::hline(&mut out, mid_y, 1, draw::GREEN);

    if let Some(target) = tracker.primary_target() {
        draw::rect_outline(&mut out, target.latest_rect(), 2, draw::BLUE);
        if target.points().len() > 1 {
            draw::polyline(&mut out, target.points(), draw::YELLOW);
        }
    }

    if fired {
        draw::hline(&mut out, mid_y, 3, draw::RED);
    }

    draw::stamp_text(
        &mut out,
        font,
        &format!("FPS : {fps:.2}"),
        Point::new(40, 20),
        draw::GREEN,
    );
    out
}
