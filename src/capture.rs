//! Screen capture module
//! Uses `xcap` to grab the monitor containing the configured region and crops
//! the region out of it. Region coordinates are global (virtual desktop).
//! Permissions note: On macOS, grant "Screen & System Audio Recording" permission to the terminal.

use anyhow::{bail, Context, Result};
use image::RgbaImage;
use std::time::Instant;
use tracing::{debug, info};
use xcap::Monitor;

use crate::config::Region;

/// Supplies the most recent frame for a region.
pub trait CaptureSource {
    fn grab(&mut self, region: &Region) -> Result<RgbaImage>;
}

/// Monitor geometry in global coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Bounds {
    fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x + self.width as i32
            && y < self.y + self.height as i32
    }
}

/// Crop rectangle of `region` inside a monitor image, in monitor-local pixels.
fn local_crop(bounds: Bounds, region: &Region) -> Result<(u32, u32, u32, u32)> {
    if !bounds.contains(region.left, region.top) {
        bail!(
            "Region origin ({}, {}) lies outside monitor at ({}, {}) {}x{}",
            region.left, region.top, bounds.x, bounds.y, bounds.width, bounds.height
        );
    }
    let x = (region.left - bounds.x) as u32;
    let y = (region.top - bounds.y) as u32;
    if x.saturating_add(region.width) > bounds.width || y.saturating_add(region.height) > bounds.height {
        bail!(
            "Region ({},{},{},{}) exceeds monitor dimensions {}x{}",
            region.left, region.top, region.width, region.height, bounds.width, bounds.height
        );
    }
    Ok((x, y, region.width, region.height))
}

/// xcap-backed capture of a single monitor.
pub struct ScreenCapture {
    monitor: Monitor,
    bounds: Bounds,
}

impl ScreenCapture {
    /// Picks the monitor that contains the region's top-left corner.
    pub fn for_region(region: &Region) -> Result<Self> {
        let monitors = Monitor::all().context("Failed to enumerate monitors")?;
        if monitors.is_empty() {
            bail!("No monitors found");
        }

        for monitor in monitors {
            let bounds = Bounds {
                x: monitor.x().context("Failed to read monitor x")?,
                y: monitor.y().context("Failed to read monitor y")?,
                width: monitor.width().context("Failed to read monitor width")?,
                height: monitor.height().context("Failed to read monitor height")?,
            };
            if bounds.contains(region.left, region.top) {
                local_crop(bounds, region)?;
                info!(
                    monitor = %monitor.name().unwrap_or_default(),
                    x = bounds.x,
                    y = bounds.y,
                    width = bounds.width,
                    height = bounds.height,
                    "capture monitor selected"
                );
                return Ok(Self { monitor, bounds });
            }
        }
        bail!(
            "No monitor contains region origin ({}, {})",
            region.left,
            region.top
        )
    }
}

impl CaptureSource for ScreenCapture {
    fn grab(&mut self, region: &Region) -> Result<RgbaImage> {
        let start = Instant::now();

        let screenshot = self
            .monitor
            .capture_image()
            .context("Failed to capture image. On macOS, ensure the terminal has Screen Recording permission")?;
        if screenshot.width() == 0 || screenshot.height() == 0 {
            bail!("Captured empty screenshot - possible permission issue or no display");
        }

        // Physical pixels may differ from logical bounds on scaled displays.
        let bounds = Bounds {
            width: screenshot.width(),
            height: screenshot.height(),
            ..self.bounds
        };
        let (x, y, w, h) = local_crop(bounds, region)?;
        let cropped = image::imageops::crop_imm(&screenshot, x, y, w, h).to_image();

        debug!(latency = ?start.elapsed(), "capture + crop");
        Ok(cropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONITOR: Bounds = Bounds { x: 1920, y: 0, width: 2560, height: 1440 };

    #[test]
    fn test_local_crop_translates_to_monitor() {
        let region = Region { top: 180, left: 2000, width: 800, height: 600 };
        assert_eq!(local_crop(MONITOR, &region).unwrap(), (80, 180, 800, 600));
    }

    #[test]
    fn test_local_crop_rejects_origin_outside() {
        let region = Region { top: 10, left: 100, width: 50, height: 50 };
        assert!(local_crop(MONITOR, &region).is_err());
    }

    #[test]
    fn test_local_crop_rejects_overflow() {
        let region = Region { top: 1000, left: 4000, width: 800, height: 600 };
        assert!(local_crop(MONITOR, &region).is_err());
    }

    #[test]
    #[ignore = "requires graphical display and screen recording permissions"]
    fn test_capture_dimensions() {
        let region = Region { top: 0, left: 0, width: 64, height: 64 };
        let mut capture = ScreenCapture::for_region(&region).expect("no monitor at origin");
        let img = capture.grab(&region).expect("grab failed");
        assert_eq!(img.dimensions(), (64, 64));
    }
}
