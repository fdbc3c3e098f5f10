//! Two-channel foreground segmentation and ROI extraction.
//!
//! Every frame runs the same fixed chain per channel: erode the input
//! plane, apply the background model, smooth the foreground mask, erode it
//! again, then reduce connected foreground regions to size-gated bounding
//! rectangles. The primary channel sees the luma plane of the whole frame;
//! the secondary channel sees the hue plane of the bottom third, where hue
//! contrast separates aircraft from ground cover that washes out the luma
//! subtraction.

use tracing::debug;

use gate_frame::{BgrFrame, MonoFrame};
use gate_imops::{erode_rect, gaussian_blur};
use gate_types::{DetectorConfig, Rect};

mod background_model;
pub use background_model::{BackgroundSubtractor, RunningGaussianBackground};

mod errors;
pub use errors::{Error, Result};

const ERODE_RADIUS: usize = 6;

/// One background-subtraction channel with its filter chain.
pub struct ChannelSegmenter {
    model: Box<dyn BackgroundSubtractor>,
    blur_ksize: usize,
    blur_sigma: f32,
    eroded: MonoFrame,
    raw_mask: MonoFrame,
    smoothed: MonoFrame,
    mask: MonoFrame,
}

impl ChannelSegmenter {
    pub fn new(
        width: u32,
        height: u32,
        model: Box<dyn BackgroundSubtractor>,
        blur_ksize: usize,
        blur_sigma: f32,
    ) -> Self {
        Self {
            model,
            blur_ksize,
            blur_sigma,
            eroded: MonoFrame::zeros(width, height),
            raw_mask: MonoFrame::zeros(width, height),
            smoothed: MonoFrame::zeros(width, height),
            mask: MonoFrame::zeros(width, height),
        }
    }

    /// Produce the channel's foreground mask for this frame's plane.
    pub fn segment(&mut self, plane: &MonoFrame) -> &MonoFrame {
        erode_rect(plane, &mut self.eroded, ERODE_RADIUS);
        self.model.apply(&self.eroded, &mut self.raw_mask);
        gaussian_blur(
            &self.raw_mask,
            &mut self.smoothed,
            self.blur_ksize,
            self.blur_sigma,
        );
        erode_rect(&self.smoothed, &mut self.mask, ERODE_RADIUS);
        &self.mask
    }
}

/// Both channels plus the ROI collector.
pub struct FrameSegmenter {
    width: u32,
    height: u32,
    cfg: DetectorConfig,
    primary: ChannelSegmenter,
    secondary: ChannelSegmenter,
    secondary_offset: u32,
}

impl FrameSegmenter {
    /// Segmenter with the standard models: full-frame luma (history 90,
    /// variance threshold 16) and bottom-third hue (history 90, variance
    /// threshold 32), shadow detection off.
    pub fn new(width: u32, height: u32, cfg: DetectorConfig) -> Self {
        let secondary_offset = height * 2 / 3;
        let primary_model = Box::new(RunningGaussianBackground::new(width, height, 90, 16.0));
        let secondary_model = Box::new(RunningGaussianBackground::new(
            width,
            height - secondary_offset,
            90,
            32.0,
        ));
        Self::with_models(width, height, cfg, primary_model, secondary_model)
    }

    /// Segmenter with caller-provided models (e.g. a GPU subtractor).
    pub fn with_models(
        width: u32,
        height: u32,
        cfg: DetectorConfig,
        primary_model: Box<dyn BackgroundSubtractor>,
        secondary_model: Box<dyn BackgroundSubtractor>,
    ) -> Self {
        let secondary_offset = height * 2 / 3;
        Self {
            width,
            height,
            cfg,
            primary: ChannelSegmenter::new(width, height, primary_model, 5, 3.5),
            secondary: ChannelSegmenter::new(
                width,
                height - secondary_offset,
                secondary_model,
                3,
                5.0,
            ),
            secondary_offset,
        }
    }

    /// Run both channels over one frame and collect the capped ROI list,
    /// primary channel first.
    pub fn process_frame(&mut self, frame: &BgrFrame) -> Result<Vec<Rect>> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(Error::FrameSizeChanged {
                expected_width: self.width,
                expected_height: self.height,
                width: frame.width(),
                height: frame.height(),
            });
        }

        let mut rois = Vec::with_capacity(self.cfg.max_targets);

        let luma = frame.luma_plane();
        let mask = self.primary.segment(&luma);
        extract_rois(mask, 0, &self.cfg, &mut rois);

        let hue = frame.hue_plane(self.secondary_offset);
        let mask = self.secondary.segment(&hue);
        extract_rois(mask, self.secondary_offset as i32, &self.cfg, &mut rois);

        if !rois.is_empty() {
            debug!("frame {}: {} ROIs", frame.fno, rois.len());
        }
        Ok(rois)
    }
}

struct Component {
    rect: Rect,
    area: u64,
}

/// Reduce a foreground mask to size-gated bounding rectangles, largest
/// area first, shifted by `y_offset`, appending to `out` until the
/// per-frame cap is reached.
pub fn extract_rois(mask: &MonoFrame, y_offset: i32, cfg: &DetectorConfig, out: &mut Vec<Rect>) {
    if out.len() >= cfg.max_targets {
        return;
    }
    let mut components = connected_components(mask);
    components.retain(|c| {
        c.rect.width > cfg.min_width
            && c.rect.height > cfg.min_height
            && c.rect.width <= cfg.max_width
            && c.rect.height <= cfg.max_height
    });
    components.sort_by(|a, b| b.area.cmp(&a.area));
    for c in components {
        if out.len() >= cfg.max_targets {
            break;
        }
        out.push(c.rect.shifted(0, y_offset));
    }
}

/// 8-connected components of nonzero pixels, as bounding box plus pixel
/// count.
fn connected_components(mask: &MonoFrame) -> Vec<Component> {
    let w = mask.width() as i32;
    let h = mask.height() as i32;
    let mut visited = vec![false; (w * h) as usize];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if visited[idx] || mask.pixel(x as u32, y as u32) == 0 {
                continue;
            }
            visited[idx] = true;
            stack.push((x, y));
            let (mut min_x, mut max_x, mut min_y, mut max_y) = (x, x, y, y);
            let mut area = 0u64;
            while let Some((cx, cy)) = stack.pop() {
                area += 1;
                min_x = min_x.min(cx);
                max_x = max_x.max(cx);
                min_y = min_y.min(cy);
                max_y = max_y.max(cy);
                for ny in (cy - 1).max(0)..=(cy + 1).min(h - 1) {
                    for nx in (cx - 1).max(0)..=(cx + 1).min(w - 1) {
                        let nidx = (ny * w + nx) as usize;
                        if !visited[nidx] && mask.pixel(nx as u32, ny as u32) != 0 {
                            visited[nidx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
            components.push(Component {
                rect: Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1),
                area,
            });
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_blocks(width: u32, height: u32, blocks: &[Rect]) -> MonoFrame {
        let mut m = MonoFrame::zeros(width, height);
        for b in blocks {
            for y in b.y..b.y + b.height {
                for x in b.x..b.x + b.width {
                    m.set_pixel(x as u32, y as u32, 255);
                }
            }
        }
        m
    }

    #[test]
    fn components_are_eight_connected() {
        // Two pixels touching only diagonally form one component.
        let mut m = MonoFrame::zeros(8, 8);
        m.set_pixel(2, 2, 255);
        m.set_pixel(3, 3, 255);
        let comps = connected_components(&m);
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].rect, Rect::new(2, 2, 2, 2));
        assert_eq!(comps[0].area, 2);
    }

    #[test]
    fn separate_blocks_are_separate_components() {
        let m = mask_with_blocks(
            64,
            64,
            &[Rect::new(2, 2, 10, 10), Rect::new(30, 30, 12, 12)],
        );
        let mut comps = connected_components(&m);
        comps.sort_by(|a, b| b.area.cmp(&a.area));
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].rect, Rect::new(30, 30, 12, 12));
        assert_eq!(comps[1].rect, Rect::new(2, 2, 10, 10));
    }

    #[test]
    fn size_gates_are_strict_below_inclusive_above() {
        let cfg = DetectorConfig::default();

        // 8x8 fails the strict lower bound.
        let m = mask_with_blocks(400, 400, &[Rect::new(10, 10, 8, 8)]);
        let mut rois = Vec::new();
        extract_rois(&m, 0, &cfg, &mut rois);
        assert!(rois.is_empty());

        // 9x9 passes.
        let m = mask_with_blocks(400, 400, &[Rect::new(10, 10, 9, 9)]);
        let mut rois = Vec::new();
        extract_rois(&m, 0, &cfg, &mut rois);
        assert_eq!(rois, vec![Rect::new(10, 10, 9, 9)]);

        // 320x320 passes the inclusive upper bound, 321 fails.
        let m = mask_with_blocks(400, 400, &[Rect::new(10, 10, 320, 320)]);
        let mut rois = Vec::new();
        extract_rois(&m, 0, &cfg, &mut rois);
        assert_eq!(rois.len(), 1);

        let m = mask_with_blocks(400, 400, &[Rect::new(10, 10, 321, 321)]);
        let mut rois = Vec::new();
        extract_rois(&m, 0, &cfg, &mut rois);
        assert!(rois.is_empty());
    }

    #[test]
    fn rois_sorted_by_area_and_capped_across_calls() {
        let cfg = DetectorConfig::default();
        let m1 = mask_with_blocks(
            200,
            200,
            &[Rect::new(0, 0, 10, 10), Rect::new(50, 50, 30, 30)],
        );
        let mut rois = Vec::new();
        extract_rois(&m1, 0, &cfg, &mut rois);
        assert_eq!(
            rois,
            vec![Rect::new(50, 50, 30, 30), Rect::new(0, 0, 10, 10)]
        );

        // Second (offset) channel tops up to the cap only.
        let m2 = mask_with_blocks(
            200,
            66,
            &[Rect::new(20, 10, 12, 12), Rect::new(60, 10, 20, 20)],
        );
        extract_rois(&m2, 134, &cfg, &mut rois);
        assert_eq!(rois.len(), cfg.max_targets);
        assert_eq!(rois[2], Rect::new(60, 144, 20, 20), "largest first, shifted");
    }

    #[test]
    fn cap_respected_within_one_mask() {
        let cfg = DetectorConfig::default();
        let m = mask_with_blocks(
            300,
            100,
            &[
                Rect::new(0, 0, 10, 10),
                Rect::new(40, 0, 11, 11),
                Rect::new(80, 0, 12, 12),
                Rect::new(120, 0, 13, 13),
            ],
        );
        let mut rois = Vec::new();
        extract_rois(&m, 0, &cfg, &mut rois);
        assert_eq!(rois.len(), 3);
        assert_eq!(rois[0], Rect::new(120, 0, 13, 13));
    }
}
