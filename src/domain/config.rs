// ============================================================
// Layer 3: Detector Configuration
// ============================================================
// The single immutable configuration object threaded through
// every anchor / proposal / network constructor.
//
// Defaults reproduce the usual CTPN settings:
//   - 16 px wide anchors, 10 heights from 11 to 283 px
//   - feature stride 16 (VGG16 conv5_3)
//   - IoU 0.7 / 0.3 for foreground / background
//   - 300 sampled anchors per image, half of them positive
//   - NMS 0.7, 12000 boxes before NMS, 1000 after
//   - weight decay 0.0005 on conv / FC weights
//
// Every field has a serde default so a partial JSON file is a
// valid configuration.
//
// Reference: Tian et al. (2016) CTPN §3.1
//            serde documentation (field attributes)

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::CtpnError;

// ─── Backbone selector ────────────────────────────────────────────────────────
/// Feature extractor used in front of the RPN convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum BackboneKind {
    /// VGG16 conv1_1 .. conv5_3, stride 16, 512 channels
    Vgg16,
    /// Inception-style stem + mixed blocks, stride 16, 512 channels
    Inception,
}

impl BackboneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackboneKind::Vgg16     => "vgg16",
            BackboneKind::Inception => "inception",
        }
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackboneKind {
    type Err = CtpnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vgg16" | "vgg" | "vggnet"           => Ok(BackboneKind::Vgg16),
            "inception" | "inceptionnet"         => Ok(BackboneKind::Inception),
            _ => Err(CtpnError::UnsupportedBackbone(s.to_string())),
        }
    }
}

impl TryFrom<String> for BackboneKind {
    type Error = CtpnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ─── Regression convention ────────────────────────────────────────────────────
/// Which of the four box offsets the regression head learns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionMode {
    /// Vertical centre and height only; x offsets stay zero and the
    /// decoded box keeps the anchor's horizontal extent
    #[default]
    Vertical,
    /// Centre and log-size offsets on both axes
    Full,
}

impl RegressionMode {
    /// Per-channel mask over `(dx, dy, dw, dh)`
    pub fn channel_mask(&self) -> [f32; 4] {
        match self {
            RegressionMode::Vertical => [0.0, 1.0, 0.0, 1.0],
            RegressionMode::Full     => [1.0, 1.0, 1.0, 1.0],
        }
    }
}

// ─── Border handling ──────────────────────────────────────────────────────────
/// What the anchor assigner does with anchors crossing the image border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderPolicy {
    /// Keep them in place but label them ignore (-1)
    #[default]
    Ignore,
    /// Clip them to the image and assign them like any other anchor
    Clip,
}

// ─── Training-time settings ───────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorTargetConfig {
    /// IoU at or above which an anchor is foreground
    pub fg_overlap:          f32,
    /// IoU below which an anchor is background
    pub bg_overlap:          f32,
    /// Anchors sampled per image (positives + negatives)
    pub batch_size:          usize,
    /// Upper bound on the positive share of `batch_size`
    pub fg_fraction:         f32,
    /// Pixels an anchor may stick out of the image before the
    /// border policy applies
    pub allowed_border:      f32,
    pub border_policy:       BorderPolicy,
    pub bbox_inside_weights: [f32; 4],
    /// `None` weights every sampled anchor uniformly; `Some(p)` gives
    /// positives total weight `p` and negatives `1 - p`
    pub positive_weight:     Option<f32>,
    /// L2 scale on conv / fully-connected weights (`wd · Σ‖w‖² / 2`)
    pub weight_decay:        f32,
}

impl Default for AnchorTargetConfig {
    fn default() -> Self {
        Self {
            fg_overlap:          0.7,
            bg_overlap:          0.3,
            batch_size:          300,
            fg_fraction:         0.5,
            allowed_border:      0.0,
            border_policy:       BorderPolicy::Ignore,
            bbox_inside_weights: [1.0, 1.0, 1.0, 1.0],
            positive_weight:     None,
            weight_decay:        0.0005,
        }
    }
}

impl AnchorTargetConfig {
    /// Maximum number of foreground anchors kept per image
    pub fn positive_cap(&self) -> usize {
        (self.fg_fraction * self.batch_size as f32).floor() as usize
    }

    /// Maximum number of background anchors given the positives kept
    pub fn negative_cap(&self, num_fg: usize) -> usize {
        self.batch_size.saturating_sub(num_fg)
    }
}

// ─── Inference-time settings ──────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    /// Boxes kept after sorting, before NMS (0 keeps all)
    pub pre_nms_top_n:   usize,
    /// Boxes kept after NMS (0 keeps all)
    pub post_nms_top_n:  usize,
    pub nms_threshold:   f32,
    /// Minimum box side in original-image pixels (multiplied by the
    /// image scale before filtering)
    pub min_size:        f32,
    /// Proposals scoring below this are dropped
    pub score_threshold: f32,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            pre_nms_top_n:   12000,
            post_nms_top_n:  1000,
            nms_threshold:   0.7,
            min_size:        8.0,
            score_threshold: 0.0,
        }
    }
}

// ─── Top-level configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtpnConfig {
    pub backbone:       BackboneKind,
    pub anchor_width:   u32,
    /// Ordered anchor heights; the order fixes the channel layout
    /// of the classification and regression heads
    pub anchor_heights: Vec<u32>,
    pub num_classes:    usize,
    pub feat_stride:    u32,
    pub regression:     RegressionMode,
    pub train:          AnchorTargetConfig,
    pub test:           ProposalConfig,
}

impl Default for CtpnConfig {
    fn default() -> Self {
        Self {
            backbone:       BackboneKind::Vgg16,
            anchor_width:   16,
            anchor_heights: vec![11, 16, 23, 33, 48, 68, 97, 139, 198, 283],
            num_classes:    2,
            feat_stride:    16,
            regression:     RegressionMode::Vertical,
            train:          AnchorTargetConfig::default(),
            test:           ProposalConfig::default(),
        }
    }
}

impl CtpnConfig {
    /// Number of anchors per feature-map cell
    pub fn num_anchors(&self) -> usize {
        self.anchor_heights.len()
    }

    /// Check every value once, up front, so the layers never have to.
    pub fn validate(&self) -> Result<(), CtpnError> {
        if self.anchor_heights.is_empty() {
            return Err(CtpnError::config("anchor_heights must not be empty"));
        }
        if self.anchor_width == 0 {
            return Err(CtpnError::config("anchor_width must be positive"));
        }
        if self.anchor_heights.contains(&0) {
            return Err(CtpnError::config("anchor heights must be positive"));
        }
        if self.num_classes != 2 {
            return Err(CtpnError::config(format!(
                "num_classes must be 2 (background/text), got {}",
                self.num_classes
            )));
        }
        if self.feat_stride == 0 {
            return Err(CtpnError::config("feat_stride must be positive"));
        }

        let t = &self.train;
        if !(0.0..=1.0).contains(&t.fg_overlap) || !(0.0..=1.0).contains(&t.bg_overlap) {
            return Err(CtpnError::config("IoU thresholds must lie in [0, 1]"));
        }
        if t.bg_overlap > t.fg_overlap {
            return Err(CtpnError::config(format!(
                "bg_overlap ({}) must not exceed fg_overlap ({})",
                t.bg_overlap, t.fg_overlap
            )));
        }
        if t.batch_size == 0 {
            return Err(CtpnError::config("train.batch_size must be positive"));
        }
        if !(0.0..=1.0).contains(&t.fg_fraction) {
            return Err(CtpnError::config("train.fg_fraction must lie in [0, 1]"));
        }
        if t.allowed_border.is_nan() {
            return Err(CtpnError::config("train.allowed_border must be a number"));
        }
        if let Some(p) = t.positive_weight {
            if !(p > 0.0 && p < 1.0) {
                return Err(CtpnError::config("train.positive_weight must lie in (0, 1)"));
            }
        }

        if !(t.weight_decay >= 0.0 && t.weight_decay.is_finite()) {
            return Err(CtpnError::config("train.weight_decay must be a non-negative number"));
        }

        let p = &self.test;
        if !(p.nms_threshold > 0.0 && p.nms_threshold <= 1.0) {
            return Err(CtpnError::config("test.nms_threshold must lie in (0, 1]"));
        }
        if p.min_size.is_nan() || p.min_size < 0.0 {
            return Err(CtpnError::config("test.min_size must be non-negative"));
        }
        if p.score_threshold.is_nan() {
            return Err(CtpnError::config("test.score_threshold must be a number"));
        }

        Ok(())
    }
}
