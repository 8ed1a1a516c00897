// ============================================================
// Layer 3: Core Traits (Abstractions)
// ============================================================
// The application layer only talks to these traits, so the
// place tensors and configurations come from can change
// without touching the use cases.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::{
    boxes::{GtBox, ImageInfo},
    config::CtpnConfig,
};

// ─── RpnInput ─────────────────────────────────────────────────────────────────
/// Raw head outputs for a single image, in NHWC layout.
#[derive(Debug, Clone)]
pub struct RpnInput {
    /// Class probabilities (or raw scores) - shape [1, H, W, A·C]
    pub cls_prob:  ndarray::Array4<f32>,
    /// Regression offsets - shape [1, H, W, A·4]
    pub bbox_pred: ndarray::Array4<f32>,
    pub im_info:   ImageInfo,
    /// Ground truth, empty at inference time
    pub gt_boxes:  Vec<GtBox>,
}

// ─── RpnInputSource ───────────────────────────────────────────────────────────
/// Anything that can hand over one image's worth of head outputs.
///
/// Implementations:
///   - TensorDumpLoader → JSON dump written by a training/inference driver
pub trait RpnInputSource {
    fn load_input(&self) -> Result<RpnInput>;
}

// ─── ConfigSource ─────────────────────────────────────────────────────────────
/// Anything that can produce a validated detector configuration.
///
/// Implementations:
///   - ConfigStore → JSON file on disk (or defaults when absent)
pub trait ConfigSource {
    fn load_config(&self) -> Result<CtpnConfig>;
}
