//! Shared types for the gatecam sensor: frame-plane geometry, base
//! identity and the tunables of the detection/tracking pipeline.

use serde::{Deserialize, Serialize};

/// Which turning plane of the course this sensor node watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseKind {
    A,
    B,
    Unknown,
}

impl BaseKind {
    /// Single letter used in recording file names and log lines.
    pub fn letter(&self) -> char {
        match self {
            BaseKind::A => 'A',
            BaseKind::B => 'B',
            BaseKind::Unknown => '?',
        }
    }
}

impl std::fmt::Display for BaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Base {}", self.letter())
    }
}

/// A pixel position in frame coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top-left corner.
    pub fn tl(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn br(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Area of the intersection with `other`, zero when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> i64 {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        if x1 > x0 && y1 > y0 {
            (x1 - x0) as i64 * (y1 - y0) as i64
        } else {
            0
        }
    }

    pub fn shifted(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Size gates and per-frame cap of the ROI extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum ROI width, exclusive.
    pub min_width: i32,
    /// Minimum ROI height, exclusive.
    pub min_height: i32,
    /// Maximum ROI width, inclusive.
    pub max_width: i32,
    /// Maximum ROI height, inclusive.
    pub max_height: i32,
    /// Per-frame cap on emitted ROIs, across both channels.
    pub max_targets: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_width: 8,
            min_height: 8,
            max_width: 320,
            max_height: 320,
            max_targets: 3,
        }
    }
}

/// Association and lifecycle tunables of the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Frames a target may go unmatched before it is retired.
    pub missing_horizon: u64,
    /// Top-left distance gate of the third association test, pixels.
    pub euclidean_gate: f64,
    /// Crossings fired before the target trace is collapsed and re-armed.
    pub max_triggers: u8,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            missing_horizon: 10,
            euclidean_gate: 240.0,
            max_triggers: 4,
        }
    }
}

/// Arming thresholds of the crossing evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossingConfig {
    /// Minimum cumulative course length before a crossing may fire, pixels.
    pub min_course_length: f64,
    /// Minimum number of tracked observations before a crossing may fire.
    pub min_tracked_count: usize,
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self {
            min_course_length: 120.0,
            min_tracked_count: 3,
        }
    }
}
