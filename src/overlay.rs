//! Debug overlay for interactive tuning.
//! Annotates the captured region (scan border, located blob, spike marker) and
//! writes it to `screenshots/debug_frame.png`. Detection never depends on it.

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::fs;
use std::path::PathBuf;

use crate::baseline::Reading;
use crate::blob::Blob;

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
const YELLOW: Rgba<u8> = Rgba([255, 255, 0, 255]);

/// What the loop saw this iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Annotations {
    pub blob: Option<Blob>,
    pub reading: Option<Reading>,
}

pub trait DebugDisplay {
    fn show(&mut self, frame: &RgbaImage, annotations: &Annotations) -> Result<()>;
    /// `true` when the user asked to quit from the display.
    fn poll_quit(&mut self) -> bool;
}

pub fn annotate(frame: &RgbaImage, annotations: &Annotations) -> RgbaImage {
    let mut img = frame.clone();
    let (w, h) = img.dimensions();

    draw_hollow_rect_mut(&mut img, Rect::at(0, 0).of_size(w, h), RED);

    let spiking = annotations.reading.is_some_and(|r| r.spike);
    if spiking && w > 2 && h > 2 {
        draw_hollow_rect_mut(&mut img, Rect::at(1, 1).of_size(w - 2, h - 2), YELLOW);
    }

    if let Some(blob) = annotations.blob {
        draw_hollow_rect_mut(
            &mut img,
            Rect::at(blob.left as i32, blob.top as i32).of_size(blob.width, blob.height),
            GREEN,
        );
        draw_hollow_circle_mut(&mut img, (blob.x as i32, blob.y as i32), 8, GREEN);
    }
    img
}

/// Writes every `every`-th annotated frame to disk.
pub struct FrameDumpDisplay {
    path: PathBuf,
    every: u32,
    counter: u32,
}

impl FrameDumpDisplay {
    pub fn new(dir: impl Into<PathBuf>, every: u32) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create debug directory {}", dir.display()))?;
        Ok(Self {
            path: dir.join("debug_frame.png"),
            every: every.max(1),
            counter: 0,
        })
    }
}

impl DebugDisplay for FrameDumpDisplay {
    fn show(&mut self, frame: &RgbaImage, annotations: &Annotations) -> Result<()> {
        self.counter = self.counter.wrapping_add(1);
        if self.counter % self.every != 0 {
            return Ok(());
        }
        annotate(frame, annotations)
            .save(&self.path)
            .with_context(|| format!("Failed to save debug frame to {}", self.path.display()))
    }

    /// A file sink has no input; quitting goes through the stop key.
    fn poll_quit(&mut self) -> bool {
        false
    }
}
