//! Config module.
//! Holds every tuning constant for a fishing session (region, audio block,
//! spike threshold, timers, color ranges, motion parameters).
//! Built once at startup from the CLI and read-only afterwards.

use anyhow::{bail, Result};
use std::time::Duration;

/// Which detectors are active and how their outputs combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetectionMode {
    /// Color blob located AND audio spike in the same iteration
    #[default]
    Combined,
    /// Audio spike only
    Audio,
    /// Frame-difference motion blob only
    Motion,
}

impl DetectionMode {
    pub fn uses_audio(self) -> bool {
        matches!(self, DetectionMode::Combined | DetectionMode::Audio)
    }

    pub fn uses_vision(self) -> bool {
        matches!(self, DetectionMode::Combined | DetectionMode::Motion)
    }

    /// Combines per-iteration detector outputs into a qualifying-event flag.
    pub fn qualifies(self, detection_present: bool, signal_spike: bool) -> bool {
        match self {
            DetectionMode::Combined => detection_present && signal_spike,
            DetectionMode::Audio => signal_spike,
            DetectionMode::Motion => detection_present,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "combined" => Some(DetectionMode::Combined),
            "audio" => Some(DetectionMode::Audio),
            "motion" => Some(DetectionMode::Motion),
            _ => None,
        }
    }
}

impl std::fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionMode::Combined => write!(f, "combined (color blob + audio spike)"),
            DetectionMode::Audio => write!(f, "audio spike"),
            DetectionMode::Motion => write!(f, "motion blob"),
        }
    }
}

/// Screen capture window in global screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub top: i32,
    pub left: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Translates a point local to the region into global screen coordinates.
    pub fn to_global(&self, x: u32, y: u32) -> (i32, i32) {
        (self.left + x as i32, self.top + y as i32)
    }

    pub fn center(&self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }
}

/// Inclusive HSV bounds, OpenCV convention (H 0..=180, S/V 0..=255).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

/// One target color; several ranges are OR'd (red wraps the hue axis).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorTarget {
    pub name: &'static str,
    pub ranges: Vec<HsvRange>,
}

impl ColorTarget {
    pub fn matches(&self, hsv: [u8; 3]) -> bool {
        self.ranges.iter().any(|r| r.contains(hsv))
    }
}

/// Red and blue feathers of the bobber.
pub fn default_color_targets() -> Vec<ColorTarget> {
    vec![
        ColorTarget {
            name: "red",
            ranges: vec![
                HsvRange::new([0, 80, 50], [10, 255, 255]),
                HsvRange::new([170, 80, 50], [180, 255, 255]),
            ],
        },
        ColorTarget {
            name: "blue",
            ranges: vec![HsvRange::new([100, 80, 40], [140, 255, 255])],
        },
    ]
}

/// Frame-difference parameters for motion mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionParams {
    /// Gaussian sigma applied before differencing (21x21 kernel equivalent).
    pub blur_sigma: f32,
    /// Absolute grayscale difference above which a pixel counts as moving.
    pub diff_threshold: u8,
    /// Chebyshev dilation radius applied to the binarized difference.
    pub dilate_radius: u8,
    /// Regions smaller than this (pixels) are ripple noise.
    pub min_area: u32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            blur_sigma: 3.5,
            diff_threshold: 30,
            dilate_radius: 2,
            min_area: 1500,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mode: DetectionMode,
    pub region: Region,

    pub sample_rate: u32,
    pub block_duration: Duration,
    pub spike_threshold: f32,
    pub baseline_alpha: f32,
    pub baseline_epsilon: f32,

    pub event_cooldown: Duration,
    pub action_debounce: Duration,
    pub watchdog_timeout: Duration,
    pub settle: Duration,
    /// Random pause between catch and recast, drawn from [min, max).
    pub loot_pause: (Duration, Duration),
    pub startup_delay: Duration,

    pub color_targets: Vec<ColorTarget>,
    pub motion: MotionParams,

    pub recast_key: char,
    pub stop_key: String,
    /// Write an annotated frame every N iterations; `None` disables the overlay.
    pub debug_every: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: DetectionMode::default(),
            region: Region {
                top: 180,
                left: 4600,
                width: 2600,
                height: 800,
            },
            sample_rate: 44_100,
            block_duration: Duration::from_millis(100),
            spike_threshold: 2.0,
            baseline_alpha: 0.98,
            baseline_epsilon: 1e-6,
            event_cooldown: Duration::from_secs(2),
            action_debounce: Duration::from_secs(2),
            watchdog_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(5),
            loot_pause: (Duration::from_millis(1000), Duration::from_millis(1500)),
            startup_delay: Duration::from_secs(5),
            color_targets: default_color_targets(),
            motion: MotionParams::default(),
            recast_key: '1',
            stop_key: "F12".to_string(),
            debug_every: None,
        }
    }
}

impl Config {
    /// Samples per audio block.
    pub fn block_size(&self) -> usize {
        (self.sample_rate as f64 * self.block_duration.as_secs_f64()) as usize
    }

    /// Minimum blob area for the active vision detector.
    pub fn min_blob_area(&self) -> u32 {
        match self.mode {
            DetectionMode::Motion => self.motion.min_area,
            _ => 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.width == 0 || self.region.height == 0 {
            bail!(
                "Capture region {}x{} is empty",
                self.region.width,
                self.region.height
            );
        }
        if !(self.baseline_alpha > 0.0 && self.baseline_alpha < 1.0) {
            bail!(
                "Baseline smoothing factor {} must lie strictly between 0 and 1",
                self.baseline_alpha
            );
        }
        if !(self.spike_threshold > 0.0) {
            bail!("Spike threshold factor {} must be positive", self.spike_threshold);
        }
        if !(self.baseline_epsilon > 0.0) {
            bail!("Baseline epsilon must be positive");
        }
        if self.mode.uses_audio() && (self.sample_rate == 0 || self.block_size() == 0) {
            bail!(
                "Audio block of {:?} at {} Hz contains no samples",
                self.block_duration,
                self.sample_rate
            );
        }
        if self.loot_pause.0 > self.loot_pause.1 {
            bail!("Loot pause lower bound exceeds upper bound");
        }
        if self.mode == DetectionMode::Combined && self.color_targets.is_empty() {
            bail!("Combined mode needs at least one color target");
        }
        Ok(())
    }
}
