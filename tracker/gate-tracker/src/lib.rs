//! Multi-target short-horizon tracker and the mid-line crossing evaluator.
//!
//! Targets are owned by value in a generational arena; the primary handle
//! is an index-plus-generation that is validated before every use, so a
//! retired slot can never be confused with its successor. Iteration order
//! over targets is the area-descending order established at the end of the
//! previous frame.

use tracing::debug;

use gate_types::{Rect, TrackerConfig};

mod crossing;
mod target;

pub use crossing::{Crossing, CrossingMonitor};
pub use target::Target;

/// Stable handle to a target in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetId {
    index: usize,
    generation: u64,
}

struct Slot {
    generation: u64,
    target: Option<Target>,
}

pub struct Tracker {
    cfg: TrackerConfig,
    slots: Vec<Slot>,
    /// Area-descending iteration order, rebuilt at the end of each frame.
    order: Vec<TargetId>,
    frame_tick: u64,
    primary: Option<TargetId>,
}

impl Tracker {
    pub fn new(cfg: TrackerConfig) -> Self {
        Self {
            cfg,
            slots: Vec::new(),
            order: Vec::new(),
            frame_tick: 0,
            primary: None,
        }
    }

    /// Consume this frame's ROI list and advance the frame tick.
    pub fn update(&mut self, rois: &[Rect]) {
        let tick = self.frame_tick;
        let gate = self.cfg.euclidean_gate;
        let max_triggers = self.cfg.max_triggers;
        let mut consumed = vec![false; rois.len()];
        // Targets already bound this frame; never rebind them.
        let mut bound: Vec<TargetId> = Vec::new();

        // Step A: the primary gets first claim on the detections.
        if let Some(pid) = self.primary {
            let found = match self.get(pid) {
                Some(t) => find_match(t, rois, &consumed, tick, gate),
                None => {
                    debug_assert!(false, "primary handle points outside the arena");
                    self.primary = None;
                    None
                }
            };
            if let Some(i) = found {
                consumed[i] = true;
                if let Some(t) = self.get_mut(pid) {
                    t.update(rois[i], tick, max_triggers);
                }
                bound.push(pid);
            }
        }

        // Step B: reap targets that stayed lost past the horizon.
        let candidates = self.order.clone();
        for id in candidates {
            if bound.contains(&id) {
                continue;
            }
            let Some(t) = self.get(id) else { continue };
            if find_match(t, rois, &consumed, tick, gate).is_none()
                && tick - t.last_seen_tick() > self.cfg.missing_horizon
            {
                debug!("lost target at {:?}", t.latest_point());
                self.remove(id);
            }
        }

        // Step C: bind remaining detections, birthing where nothing matches.
        for (i, roi) in rois.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            let mut matched = None;
            for &id in &self.order {
                if bound.contains(&id) {
                    continue;
                }
                let Some(t) = self.get(id) else { continue };
                if roi_matches(t, roi, tick, gate) {
                    matched = Some(id);
                    break;
                }
            }
            match matched {
                Some(id) => {
                    consumed[i] = true;
                    if let Some(t) = self.get_mut(id) {
                        t.update(*roi, tick, max_triggers);
                    }
                    bound.push(id);
                }
                None => {
                    debug!("new target at {:?}", roi.tl());
                    let id = self.insert(Target::new(*roi, tick));
                    self.order.push(id);
                    bound.push(id);
                }
            }
        }

        self.frame_tick = tick + 1;

        // Step D: keep iteration order area-descending and promote a
        // primary when none is set.
        if self.order.len() > 1 {
            let mut order = std::mem::take(&mut self.order);
            order.sort_by_key(|id| {
                std::cmp::Reverse(self.get(*id).map(|t| t.latest_rect().area()).unwrap_or(0))
            });
            self.order = order;
        }
        if self.primary.is_none() {
            self.primary = self.order.first().copied();
        }
    }

    pub fn primary_id(&self) -> Option<TargetId> {
        self.primary
    }

    pub fn primary_target(&self) -> Option<&Target> {
        self.primary.and_then(|id| self.get(id))
    }

    pub(crate) fn primary_target_mut(&mut self) -> Option<&mut Target> {
        match self.primary {
            Some(id) => self.get_mut(id),
            None => None,
        }
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.target.as_ref())
    }

    fn get_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.target.as_mut())
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.order.iter().filter_map(|id| self.get(*id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn frame_tick(&self) -> u64 {
        self.frame_tick
    }

    fn insert(&mut self, target: Target) -> TargetId {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.target.is_none() {
                slot.generation += 1;
                slot.target = Some(target);
                return TargetId {
                    index,
                    generation: slot.generation,
                };
            }
        }
        self.slots.push(Slot {
            generation: 0,
            target: Some(target),
        });
        TargetId {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    fn remove(&mut self, id: TargetId) {
        if let Some(slot) = self
            .slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
        {
            slot.target = None;
            self.order.retain(|x| *x != id);
            if self.primary == Some(id) {
                self.primary = None;
            }
        }
    }
}

/// The three association tests, in order, for one detection.
fn roi_matches(t: &Target, roi: &Rect, tick: u64, gate: f64) -> bool {
    let last = t.latest_rect();
    if last.intersection_area(roi) > 0 {
        return true;
    }
    let df = (tick - t.last_seen_tick()) as i32;
    let v = t.velocity();
    if last.shifted(v.x * df, v.y * df).intersection_area(roi) > 0 {
        return true;
    }
    last.tl().distance_to(roi.tl()) < gate
}

/// First unconsumed detection that any of the three tests binds to `t`.
fn find_match(
    t: &Target,
    rois: &[Rect],
    consumed: &[bool],
    tick: u64,
    gate: f64,
) -> Option<usize> {
    rois.iter()
        .enumerate()
        .filter(|(i, _)| !consumed[*i])
        .find(|(_, roi)| roi_matches(t, roi, tick, gate))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_types::Point;

    fn roi(x: i32, y: i32) -> Rect {
        Rect::new(x, y, 40, 40)
    }

    fn tracker() -> Tracker {
        Tracker::new(TrackerConfig::default())
    }

    #[test]
    fn birth_and_promotion() {
        let mut tr = tracker();
        tr.update(&[roi(100, 100)]);
        assert_eq!(tr.len(), 1);
        let p = tr.primary_target().expect("promoted");
        assert_eq!(p.first_point(), Point::new(100, 100));
    }

    #[test]
    fn overlap_association_continues_target() {
        let mut tr = tracker();
        tr.update(&[roi(100, 100)]);
        tr.update(&[roi(110, 110)]);
        assert_eq!(tr.len(), 1);
        assert_eq!(tr.primary_target().unwrap().tracked_count(), 2);
    }

    #[test]
    fn euclidean_gate_bounds_association() {
        // A freshly born target has zero velocity, so neither overlap test
        // can bind a detection this far away; only the distance gate can.
        let mut tr = tracker();
        tr.update(&[roi(100, 100)]);
        // 239 px away: inside the gate, same target.
        tr.update(&[roi(339, 100)]);
        assert_eq!(tr.len(), 1);

        let mut tr = tracker();
        tr.update(&[roi(100, 100)]);
        // 240 px away: outside (strict <), a second target is born.
        tr.update(&[roi(340, 100)]);
        assert_eq!(tr.len(), 2);
    }

    #[test]
    fn velocity_extrapolation_reacquires_beyond_the_gate() {
        let mut tr = tracker();
        tr.update(&[roi(0, 100)]);
        tr.update(&[roi(50, 100)]); // velocity (50, 0)
        for _ in 0..5 {
            tr.update(&[]);
        }
        // Extrapolated rect sits at (350, 100); direct overlap fails and the
        // top-left distance (300 px) exceeds the gate.
        tr.update(&[roi(350, 105)]);
        assert_eq!(tr.len(), 1, "reacquired, not reborn");
        assert_eq!(tr.primary_target().unwrap().tracked_count(), 3);
    }

    #[test]
    fn one_detection_updates_only_one_target() {
        let mut tr = tracker();
        tr.update(&[roi(100, 100)]);
        // Two detections both overlapping the single target: the first
        // binds it, the second births a new target.
        tr.update(&[roi(105, 105), roi(110, 110)]);
        assert_eq!(tr.len(), 2);
        let counts: Vec<usize> = tr.targets().map(|t| t.tracked_count()).collect();
        assert!(counts.contains(&2) && counts.contains(&1));
    }

    #[test]
    fn horizon_reaps_and_nulls_primary() {
        let mut tr = tracker();
        tr.update(&[roi(100, 100)]);
        assert!(tr.primary_id().is_some());
        for _ in 0..11 {
            tr.update(&[]);
        }
        assert!(tr.is_empty());
        assert!(tr.primary_id().is_none());
        assert!(tr.primary_target().is_none());
    }

    #[test]
    fn primary_is_largest_on_promotion() {
        let mut tr = tracker();
        tr.update(&[
            Rect::new(0, 0, 20, 20),
            Rect::new(300, 0, 60, 60),
            Rect::new(600, 0, 40, 40),
        ]);
        let p = tr.primary_target().unwrap();
        assert_eq!(p.latest_rect(), Rect::new(300, 0, 60, 60));
    }

    #[test]
    fn primary_survives_demotion_by_area() {
        // Once set, the primary stays primary even when a larger target
        // appears later.
        let mut tr = tracker();
        tr.update(&[Rect::new(0, 0, 20, 20)]);
        tr.update(&[Rect::new(5, 5, 20, 20), Rect::new(600, 300, 100, 100)]);
        let p = tr.primary_target().unwrap();
        assert_eq!(p.latest_rect(), Rect::new(5, 5, 20, 20));
    }

    #[test]
    fn primary_claims_detection_before_other_targets() {
        let mut tr = tracker();
        // Two targets; the smaller one is primary (promoted first frame
        // alone).
        tr.update(&[Rect::new(100, 100, 20, 20)]);
        tr.update(&[Rect::new(100, 100, 20, 20), Rect::new(400, 100, 80, 80)]);
        let pid = tr.primary_id().unwrap();
        // One detection overlapping both: consumed by the primary.
        tr.update(&[Rect::new(100, 100, 400, 80)]);
        let p = tr.get(pid).unwrap();
        assert_eq!(p.tracked_count(), 3);
    }

    #[test]
    fn stale_ids_do_not_resolve_after_reuse() {
        let mut tr = tracker();
        tr.update(&[roi(100, 100)]);
        let old = tr.primary_id().unwrap();
        for _ in 0..11 {
            tr.update(&[]);
        }
        assert!(tr.get(old).is_none());
        // New target reuses the slot under a fresh generation.
        tr.update(&[roi(500, 500)]);
        assert!(tr.get(old).is_none());
        assert_eq!(tr.len(), 1);
    }
}
