use tracing::info;

use gate_types::CrossingConfig;

use crate::Tracker;

/// A fired mid-line crossing.
///
/// `new_crossing` distinguishes the first fire of a target's arm cycle
/// (advances the wire sequence) from a repeat fire (re-sends it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub new_crossing: bool,
}

/// Per-frame crossing policy over the primary target.
///
/// The predicate compares the *first* and *latest* observed points of the
/// track, so a target only fires after genuinely moving from one side of
/// the mid-line to the other over its whole course; jitter around the
/// birth position can never fire. The asymmetric comparison (`>`/`≤`
/// against `<`/`≥`) means a track whose first point lies exactly on the
/// mid-line never satisfies either arm, which is intended: a crossing must
/// start clearly off-line.
pub struct CrossingMonitor {
    mid_y: i32,
    cfg: CrossingConfig,
    max_triggers: u8,
}

impl CrossingMonitor {
    pub fn new(frame_height: u32, cfg: CrossingConfig, max_triggers: u8) -> Self {
        Self {
            mid_y: (frame_height / 2) as i32 - 1,
            cfg,
            max_triggers,
        }
    }

    pub fn mid_y(&self) -> i32 {
        self.mid_y
    }

    /// Evaluate after this frame's tracker update; at most one crossing
    /// fires per frame.
    pub fn evaluate(&self, tracker: &mut Tracker) -> Option<Crossing> {
        let mid_y = self.mid_y;
        let target = tracker.primary_target_mut()?;

        if !(target.course_length() > self.cfg.min_course_length
            && target.tracked_count() > self.cfg.min_tracked_count)
        {
            return None;
        }

        let first = target.first_point().y;
        let latest = target.latest_point().y;
        let straddles = (first > mid_y && latest <= mid_y) || (first < mid_y && latest >= mid_y);
        if !straddles {
            return None;
        }

        if target.trigger_count() >= self.max_triggers {
            return None;
        }

        let crossing = Crossing {
            new_crossing: target.trigger_count() == 0,
        };
        target.fire();
        info!(
            new_crossing = crossing.new_crossing,
            trigger_count = target.trigger_count(),
            "crossing at y {} over mid-line {}",
            latest,
            mid_y
        );
        Some(crossing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_types::{Rect, TrackerConfig};

    fn drive(tracker: &mut Tracker, monitor: &CrossingMonitor, y: i32) -> Option<Crossing> {
        tracker.update(&[Rect::new(600, y, 40, 40)]);
        monitor.evaluate(tracker)
    }

    #[test]
    fn first_point_on_midline_never_fires() {
        let monitor = CrossingMonitor::new(720, CrossingConfig::default(), 4);
        assert_eq!(monitor.mid_y(), 359);
        let mut tracker = Tracker::new(TrackerConfig::default());

        // Born exactly on the mid-line, then far to either side.
        assert!(drive(&mut tracker, &monitor, 359).is_none());
        assert!(drive(&mut tracker, &monitor, 259).is_none());
        assert!(drive(&mut tracker, &monitor, 159).is_none());
        assert!(drive(&mut tracker, &monitor, 59).is_none());
        for y in [159, 259, 359, 459, 559] {
            assert!(drive(&mut tracker, &monitor, y).is_none());
        }
    }

    #[test]
    fn unarmed_target_does_not_fire() {
        let monitor = CrossingMonitor::new(720, CrossingConfig::default(), 4);
        let mut tracker = Tracker::new(TrackerConfig::default());
        // Straddles immediately, but the course is too short to arm.
        assert!(drive(&mut tracker, &monitor, 340).is_none());
        assert!(drive(&mut tracker, &monitor, 380).is_none());
    }

    #[test]
    fn no_primary_is_a_noop() {
        let monitor = CrossingMonitor::new(720, CrossingConfig::default(), 4);
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.update(&[]);
        assert!(monitor.evaluate(&mut tracker).is_none());
    }
}
