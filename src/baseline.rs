//! Rolling-baseline spike detector for a scalar signal (audio RMS).
//!
//! The baseline is an exponential moving average that adapts slowly, so a
//! sustained rise in ambient level lifts the floor instead of firing events.
//! Every sample is folded into the baseline, spikes included: a spike biases
//! the reference upward by `(1 - alpha) * sample` for that call. That bias is
//! inherent to the smoothing and is not corrected for.

/// RMS of a block of PCM samples. Empty block is silence.
#[inline]
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let f = s as f64;
            f * f
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Result of feeding one sample into the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub sample: f32,
    pub baseline: f32,
    /// `sample / baseline`; meaningless on the warm-up call.
    pub ratio: f32,
    pub spike: bool,
    /// First sample seeded the baseline; callers skip event evaluation.
    pub warm_up: bool,
}

#[derive(Debug, Clone)]
pub struct SignalBaseline {
    alpha: f32,
    epsilon: f32,
    threshold_factor: f32,
    level: Option<f32>,
}

impl SignalBaseline {
    pub fn new(alpha: f32, epsilon: f32, threshold_factor: f32) -> Self {
        Self {
            alpha,
            epsilon,
            threshold_factor,
            level: None,
        }
    }

    pub fn baseline(&self) -> Option<f32> {
        self.level
    }

    /// Forgets the reference; the next sample becomes a warm-up again.
    pub fn reset(&mut self) {
        self.level = None;
    }

    pub fn update(&mut self, sample: f32) -> Reading {
        let sample = sample.max(0.0);

        let Some(prev) = self.level else {
            let seeded = sample.max(self.epsilon);
            self.level = Some(seeded);
            return Reading {
                sample,
                baseline: seeded,
                ratio: sample / seeded,
                spike: false,
                warm_up: true,
            };
        };

        // Epsilon floor keeps the divisor positive through long silences.
        let baseline = (self.alpha * prev + (1.0 - self.alpha) * sample).max(self.epsilon);
        self.level = Some(baseline);

        let ratio = sample / baseline;
        Reading {
            sample,
            baseline,
            ratio,
            spike: ratio > self.threshold_factor,
            warm_up: false,
        }
    }
}
