use gate_frame::MonoFrame;

/// Per-pixel adaptive foreground extraction.
///
/// The deployment may plug in a GPU-backed subtractor; the pipeline only
/// requires that a full-resolution binary mask (0 background, 255
/// foreground) is produced for every input frame. Models stay in learning
/// mode continuously.
pub trait BackgroundSubtractor {
    fn apply(&mut self, input: &MonoFrame, foreground: &mut MonoFrame);
}

/// Running Gaussian background model.
///
/// Keeps a per-pixel running mean and running mean-square with learning
/// rate 1/history and marks pixels whose squared deviation from the mean
/// exceeds `var_threshold` times the variance. Variance is floored so a
/// perfectly static scene does not trigger on sensor noise.
pub struct RunningGaussianBackground {
    width: u32,
    height: u32,
    mean: Vec<f32>,
    mean_sq: Vec<f32>,
    alpha: f32,
    var_threshold: f32,
    initialized: bool,
}

const VAR_FLOOR: f32 = 4.0;

impl RunningGaussianBackground {
    pub fn new(width: u32, height: u32, history: u32, var_threshold: f32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            mean: vec![0.0; n],
            mean_sq: vec![0.0; n],
            alpha: 1.0 / history as f32,
            var_threshold,
            initialized: false,
        }
    }
}

impl BackgroundSubtractor for RunningGaussianBackground {
    fn apply(&mut self, input: &MonoFrame, foreground: &mut MonoFrame) {
        assert_eq!(input.width(), self.width);
        assert_eq!(input.height(), self.height);
        assert_eq!(foreground.width(), self.width);
        assert_eq!(foreground.height(), self.height);

        if !self.initialized {
            for (i, &px) in input.data().iter().enumerate() {
                let x = px as f32;
                self.mean[i] = x;
                self.mean_sq[i] = x * x;
            }
            self.initialized = true;
            foreground.fill(0);
            return;
        }

        for (i, (&px, out)) in input
            .data()
            .iter()
            .zip(foreground.data_mut().iter_mut())
            .enumerate()
        {
            let x = px as f32;
            let m = self.mean[i];
            let var = (self.mean_sq[i] - m * m).max(VAR_FLOOR);
            let d = x - m;
            *out = if d * d > self.var_threshold * var {
                255
            } else {
                0
            };
            self.mean[i] = m + self.alpha * (x - m);
            self.mean_sq[i] += self.alpha * (x * x - self.mean_sq[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(width: u32, height: u32, value: u8) -> MonoFrame {
        let mut f = MonoFrame::zeros(width, height);
        f.fill(value);
        f
    }

    #[test]
    fn first_frame_is_all_background() {
        let mut model = RunningGaussianBackground::new(8, 8, 90, 16.0);
        let mut fg = MonoFrame::zeros(8, 8);
        model.apply(&flat(8, 8, 77), &mut fg);
        assert!(fg.data().iter().all(|&p| p == 0));
    }

    #[test]
    fn deviating_pixel_is_foreground() {
        let mut model = RunningGaussianBackground::new(8, 8, 90, 16.0);
        let mut fg = MonoFrame::zeros(8, 8);
        for _ in 0..20 {
            model.apply(&flat(8, 8, 100), &mut fg);
        }
        assert!(fg.data().iter().all(|&p| p == 0));

        let mut moved = flat(8, 8, 100);
        moved.set_pixel(3, 3, 20);
        model.apply(&moved, &mut fg);
        assert_eq!(fg.pixel(3, 3), 255);
        assert_eq!(fg.pixel(0, 0), 0);
    }

    #[test]
    fn model_adapts_to_persistent_change() {
        // Short history, so the new level is absorbed quickly.
        let mut model = RunningGaussianBackground::new(4, 4, 5, 16.0);
        let mut fg = MonoFrame::zeros(4, 4);
        for _ in 0..10 {
            model.apply(&flat(4, 4, 50), &mut fg);
        }
        for _ in 0..60 {
            model.apply(&flat(4, 4, 200), &mut fg);
        }
        assert!(
            fg.data().iter().all(|&p| p == 0),
            "persistent level becomes background"
        );
    }
}
