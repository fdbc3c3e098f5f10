use gate_types::{Point, Rect};

/// A short-horizon track over consecutive detections of one object.
///
/// `rects` and `points` are parallel, oldest first, and never empty: the
/// constructor seeds both from the birth ROI.
#[derive(Debug, Clone)]
pub struct Target {
    rects: Vec<Rect>,
    points: Vec<Point>,
    velocity: Point,
    course_length: f64,
    last_seen_tick: u64,
    trigger_count: u8,
}

impl Target {
    pub(crate) fn new(roi: Rect, tick: u64) -> Self {
        Self {
            rects: vec![roi],
            points: vec![roi.tl()],
            velocity: Point::default(),
            course_length: 0.0,
            last_seen_tick: tick,
            trigger_count: 0,
        }
    }

    /// Append one observation.
    ///
    /// The velocity is a one-pole smoother with weight ½ on the new
    /// per-step displacement (the very first step seeds it directly).
    /// Once the target has fired `max_triggers` crossings, the appended
    /// trace immediately collapses so the target can re-arm.
    pub(crate) fn update(&mut self, roi: Rect, tick: u64, max_triggers: u8) {
        let last = self.latest_point();
        self.course_length += roi.tl().distance_to(last);

        let step = Point::new(roi.tl().x - last.x, roi.tl().y - last.y);
        if self.points.len() == 1 {
            self.velocity = step;
        } else {
            self.velocity = Point::new(
                (self.velocity.x + step.x) / 2,
                (self.velocity.y + step.y) / 2,
            );
        }

        self.rects.push(roi);
        self.points.push(roi.tl());
        self.last_seen_tick = tick;

        if self.trigger_count >= max_triggers {
            self.reset();
        }
    }

    /// Collapse the trace to the latest observation and clear the trigger
    /// count. The accumulated course length is deliberately kept.
    fn reset(&mut self) {
        debug_assert!(!self.rects.is_empty() && self.rects.len() == self.points.len());
        let r = self.rects[self.rects.len() - 1];
        let p = self.points[self.points.len() - 1];
        self.rects.clear();
        self.points.clear();
        self.rects.push(r);
        self.points.push(p);
        self.trigger_count = 0;
    }

    pub(crate) fn fire(&mut self) {
        self.trigger_count += 1;
    }

    pub fn latest_rect(&self) -> Rect {
        self.rects[self.rects.len() - 1]
    }

    pub fn latest_point(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    pub fn first_point(&self) -> Point {
        self.points[0]
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn velocity(&self) -> Point {
        self.velocity
    }

    pub fn course_length(&self) -> f64 {
        self.course_length
    }

    pub fn tracked_count(&self) -> usize {
        self.rects.len()
    }

    pub fn trigger_count(&self) -> u8 {
        self.trigger_count
    }

    pub fn last_seen_tick(&self) -> u64 {
        self.last_seen_tick
    }
}
