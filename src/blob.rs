//! Blob locator.
//! Labels 8-connected foreground regions of a binary mask and picks the
//! largest one. Returns its bounding-box center in mask-local coordinates.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    /// Bounding-box center, mask-local.
    pub x: u32,
    pub y: u32,
    /// Foreground pixel count.
    pub area: u32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    /// First pixel reached in raster order, as (row, column).
    first: (u32, u32),
    area: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Extent {
    fn new(x: u32, y: u32) -> Self {
        Self {
            first: (y, x),
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn to_blob(self) -> Blob {
        let width = self.max_x - self.min_x + 1;
        let height = self.max_y - self.min_y + 1;
        Blob {
            x: self.min_x + width / 2,
            y: self.min_y + height / 2,
            area: self.area,
            left: self.min_x,
            top: self.min_y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlobLocator {
    min_area: u32,
}

impl BlobLocator {
    pub fn new(min_area: u32) -> Self {
        Self { min_area }
    }

    /// Largest region with `area >= min_area`, or `None`.
    /// Equal areas resolve to the region reached first in raster order.
    pub fn locate(&self, mask: &GrayImage) -> Option<Blob> {
        let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

        // Index 0 is background.
        let mut extents: Vec<Option<Extent>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0] as usize;
            if label == 0 {
                continue;
            }
            if extents.len() <= label {
                extents.resize(label + 1, None);
            }
            extents[label].get_or_insert_with(|| Extent::new(x, y)).add(x, y);
        }

        let mut best: Option<Extent> = None;
        for extent in extents.into_iter().flatten() {
            if extent.area < self.min_area {
                continue;
            }
            let better = best.is_none_or(|b| {
                extent.area > b.area || (extent.area == b.area && extent.first < b.first)
            });
            if better {
                best = Some(extent);
            }
        }
        best.map(Extent::to_blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(w: u32, h: u32) -> GrayImage {
        GrayImage::new(w, h)
    }

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn test_empty_mask_returns_none() {
        assert_eq!(BlobLocator::new(1).locate(&mask(50, 50)), None);
    }

    #[test]
    fn test_single_rectangle_center() {
        let mut m = mask(100, 100);
        fill(&mut m, 40, 40, 20, 20);
        let blob = BlobLocator::new(1).locate(&m).unwrap();
        assert_eq!((blob.x, blob.y, blob.area), (50, 50, 400));
        assert_eq!((blob.left, blob.top, blob.width, blob.height), (40, 40, 20, 20));
    }

    #[test]
    fn test_odd_rectangle_center_floors() {
        let mut m = mask(30, 30);
        fill(&mut m, 3, 5, 5, 3);
        let blob = BlobLocator::new(1).locate(&m).unwrap();
        assert_eq!((blob.x, blob.y), (5, 6));
    }

    #[test]
    fn test_larger_blob_wins_regardless_of_scan_order() {
        let mut m = mask(100, 100);
        fill(&mut m, 0, 0, 5, 5);
        fill(&mut m, 50, 60, 10, 10);
        let blob = BlobLocator::new(1).locate(&m).unwrap();
        assert_eq!(blob.area, 100);
        assert_eq!((blob.x, blob.y), (55, 65));

        let mut m = mask(100, 100);
        fill(&mut m, 0, 0, 10, 10);
        fill(&mut m, 50, 60, 5, 5);
        let blob = BlobLocator::new(1).locate(&m).unwrap();
        assert_eq!((blob.x, blob.y), (5, 5));
    }

    #[test]
    fn test_tie_picks_first_in_scan_order() {
        let mut m = mask(60, 60);
        fill(&mut m, 40, 40, 4, 4);
        fill(&mut m, 2, 2, 4, 4);
        let blob = BlobLocator::new(1).locate(&m).unwrap();
        assert_eq!((blob.left, blob.top), (2, 2));
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let mut m = mask(10, 10);
        m.put_pixel(1, 1, Luma([255]));
        m.put_pixel(2, 2, Luma([255]));
        m.put_pixel(3, 3, Luma([255]));
        let blob = BlobLocator::new(1).locate(&m).unwrap();
        assert_eq!(blob.area, 3);
    }

    #[test]
    fn test_min_area_filters_small_regions() {
        let mut m = mask(200, 200);
        fill(&mut m, 0, 0, 30, 30);
        assert_eq!(BlobLocator::new(1500).locate(&m), None);

        fill(&mut m, 100, 100, 50, 40);
        let blob = BlobLocator::new(1500).locate(&m).unwrap();
        assert_eq!(blob.area, 2000);
    }
}
