// ============================================================
// Layer 4: Anchor Generator
// ============================================================
// CTPN anchors all share one width (16 px, the feature stride)
// and differ only in height. The base set is built once per
// configuration, centred on the reference cell at the origin:
//
//     cell (0, 0) covers pixels 0..=15, centre (7.5, 7.5)
//     anchor k = 16 px wide, heights[k] px tall, same centre
//
// For a feature map of H×W cells the base set is shifted by
// (col·stride, row·stride). Enumeration order is
//
//     for row in 0..H { for col in 0..W { for k in 0..A { .. } } }
//
// which is exactly the order of a [1, H, W, A·n] NHWC tensor
// flattened to [H·W·A, n], so anchor i lines up with row i of
// the reshaped head outputs.
//
// Reference: Tian et al. (2016) CTPN §3.1 (fine-scale proposals)

use crate::domain::{boxes::BBox, config::CtpnConfig, error::CtpnError};

/// The per-cell anchor shapes plus the stride used to tile them.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorGenerator {
    base:   Vec<BBox>,
    stride: f32,
}

impl AnchorGenerator {
    /// Build the base anchors from a width and an ordered height list.
    pub fn new(width: u32, heights: &[u32], stride: u32) -> Result<Self, CtpnError> {
        if heights.is_empty() {
            return Err(CtpnError::config("cannot generate anchors from an empty height list"));
        }
        if width == 0 || stride == 0 || heights.contains(&0) {
            return Err(CtpnError::config("anchor width, heights and stride must be positive"));
        }

        // Reference point: centre of a stride-sized cell at the origin
        let ctr = (stride as f32 - 1.0) * 0.5;
        let half_w = (width as f32 - 1.0) * 0.5;

        let base = heights
            .iter()
            .map(|&h| {
                let half_h = (h as f32 - 1.0) * 0.5;
                BBox::new(ctr - half_w, ctr - half_h, ctr + half_w, ctr + half_h)
            })
            .collect();

        Ok(Self { base, stride: stride as f32 })
    }

    pub fn from_config(cfg: &CtpnConfig) -> Result<Self, CtpnError> {
        Self::new(cfg.anchor_width, &cfg.anchor_heights, cfg.feat_stride)
    }

    /// Base anchors of cell (0, 0), in configured height order
    pub fn base_anchors(&self) -> &[BBox] {
        &self.base
    }

    /// Number of anchors per feature-map cell (A)
    pub fn num_anchors(&self) -> usize {
        self.base.len()
    }

    pub fn stride(&self) -> f32 {
        self.stride
    }

    /// Flat index of anchor `k` at cell `(row, col)` in a grid `width` cells wide
    pub fn flat_index(&self, row: usize, col: usize, k: usize, width: usize) -> usize {
        (row * width + col) * self.base.len() + k
    }

    /// Tile the base anchors over an H×W feature map (row-major, anchor innermost).
    pub fn shifted_anchors(&self, height: usize, width: usize) -> Vec<BBox> {
        let mut all = Vec::with_capacity(height * width * self.base.len());
        for row in 0..height {
            let dy = row as f32 * self.stride;
            for col in 0..width {
                let dx = col as f32 * self.stride;
                all.extend(self.base.iter().map(|a| a.shifted(dx, dy)));
            }
        }
        all
    }
}
