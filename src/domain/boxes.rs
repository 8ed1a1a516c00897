// ============================================================
// Layer 3: Box Domain Types
// ============================================================
// Plain geometric data shared by the anchor and proposal layers.
//
// Coordinates are inclusive pixel indices, so a box that spans
// pixels 0..=15 has width 16:
//
//     width  = x2 - x1 + 1
//     height = y2 - y1 + 1
//
// Reference: Ren et al. (2015) Faster R-CNN
//            Tian et al. (2016) CTPN

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1 + 1.0
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1 + 1.0
    }

    pub fn center_x(&self) -> f32 {
        self.x1 + 0.5 * self.width()
    }

    pub fn center_y(&self) -> f32 {
        self.y1 + 0.5 * self.height()
    }

    /// Area in pixels; zero for boxes with non-positive extent
    pub fn area(&self) -> f32 {
        if self.is_degenerate() {
            0.0
        } else {
            self.width() * self.height()
        }
    }

    /// True when width or height is non-positive (or NaN)
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Translate by a pixel offset
    pub fn shifted(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// A labelled ground-truth box for one training image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GtBox {
    pub bbox:     BBox,
    pub class_id: u32,
}

impl GtBox {
    pub fn new(bbox: BBox, class_id: u32) -> Self {
        Self { bbox, class_id }
    }

    /// Build from an `[x1, y1, x2, y2, class]` row, the layout the
    /// ground-truth placeholder used
    pub fn from_row(row: [f32; 5]) -> Self {
        Self {
            bbox:     BBox::new(row[0], row[1], row[2], row[3]),
            class_id: row[4].max(0.0) as u32,
        }
    }
}

/// Size of the network input image and the scale applied to get there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub height: f32,
    pub width:  f32,
    pub scale:  f32,
}

impl ImageInfo {
    pub fn new(height: f32, width: f32, scale: f32) -> Self {
        Self { height, width, scale }
    }

    /// Build from the `[height, width, scale]` triple
    pub fn from_triple(info: [f32; 3]) -> Self {
        Self::new(info[0], info[1], info[2])
    }
}

/// Regression offsets `(dx, dy, dw, dh)` between an anchor and a box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoxDelta {
    pub dx: f32,
    pub dy: f32,
    pub dw: f32,
    pub dh: f32,
}

impl BoxDelta {
    pub fn new(dx: f32, dy: f32, dw: f32, dh: f32) -> Self {
        Self { dx, dy, dw, dh }
    }

    pub fn from_slice(values: &[f32]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.dx, self.dy, self.dw, self.dh]
    }
}

/// One decoded text proposal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Index of the image in the batch, always 0 (batch size is 1)
    pub image_index: usize,
    pub bbox:        BBox,
    /// Foreground probability of the source anchor
    pub score:       f32,
    /// Regression offsets that produced `bbox`
    pub delta:       BoxDelta,
}

impl Proposal {
    /// The `[image_index, x1, y1, x2, y2]` ROI row
    pub fn roi(&self) -> [f32; 5] {
        [
            self.image_index as f32,
            self.bbox.x1,
            self.bbox.y1,
            self.bbox.x2,
            self.bbox.y2,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusive_width_and_height() {
        let b = BBox::new(0.0, 0.0, 15.0, 10.0);
        assert_eq!(b.width(), 16.0);
        assert_eq!(b.height(), 11.0);
        assert_eq!(b.area(), 176.0);
        assert_eq!(b.center_x(), 8.0);
    }

    #[test]
    fn test_degenerate_box_has_zero_area() {
        let b = BBox::new(10.0, 10.0, 5.0, 20.0);
        assert!(b.is_degenerate());
        assert_eq!(b.area(), 0.0);
        let nan = BBox::new(f32::NAN, 0.0, 1.0, 1.0);
        assert!(nan.is_degenerate());
    }

    #[test]
    fn test_gt_from_row() {
        let gt = GtBox::from_row([1.0, 2.0, 3.0, 4.0, 1.0]);
        assert_eq!(gt.bbox, BBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(gt.class_id, 1);
    }

    #[test]
    fn test_roi_row_has_image_index_prefix() {
        let p = Proposal {
            image_index: 0,
            bbox:        BBox::new(1.0, 2.0, 3.0, 4.0),
            score:       0.9,
            delta:       BoxDelta::default(),
        };
        assert_eq!(p.roi(), [0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
