// ============================================================
// Layer 4: Anchor Target Layer (training path)
// ============================================================
// Turns ground-truth boxes into per-anchor training targets:
//
//   Step 1: Tile the base anchors over the H×W score map
//   Step 2: Apply the border policy (ignore or clip)
//   Step 3: IoU of every anchor against every ground truth
//   Step 4: Label: background, forced positives, threshold positives
//   Step 5: Subsample positives/negatives down to the per-image caps
//   Step 6: Regression targets for the surviving positives
//   Step 7: Inside / outside loss weights
//
// Output arrays are indexed by the flat anchor index
// (row, col, anchor), so they reshape directly onto the
// [1, H, W, A·n] head outputs.
//
// Reference: Ren et al. (2015) Faster R-CNN §3.1.2
//            Tian et al. (2016) CTPN §3.1, §3.4

use ndarray::{Array1, Array2, ArrayView4};
use rand::Rng;

use crate::domain::{
    boxes::{BBox, GtBox, ImageInfo},
    config::{AnchorTargetConfig, BorderPolicy, CtpnConfig, RegressionMode},
    error::CtpnError,
};
use crate::rpn::{
    anchors::AnchorGenerator,
    geometry::{clip, encode, is_inside, overlaps},
};

// ─── Label ────────────────────────────────────────────────────────────────────
/// Per-anchor training label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Label {
    Ignore     = -1,
    Background = 0,
    Foreground = 1,
}

impl Label {
    pub fn value(self) -> i32 {
        self as i32
    }
}

// ─── AnchorTargets ────────────────────────────────────────────────────────────
/// Everything the loss needs for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorTargets {
    /// Shape [H·W·A], values in {-1, 0, 1}
    pub labels:          Array1<i32>,
    /// Shape [H·W·A, 4], (dx, dy, dw, dh); zero for non-positives
    pub bbox_targets:    Array2<f32>,
    /// Shape [H·W·A, 4]; nonzero only on positives
    pub inside_weights:  Array2<f32>,
    /// Shape [H·W·A, 4]; nonzero only on sampled anchors
    pub outside_weights: Array2<f32>,
    pub height:          usize,
    pub width:           usize,
    pub num_anchors:     usize,
}

impl AnchorTargets {
    /// Total anchors in the grid (H·W·A)
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn count(&self, label: Label) -> usize {
        self.labels.iter().filter(|&&l| l == label.value()).count()
    }

    pub fn num_foreground(&self) -> usize {
        self.count(Label::Foreground)
    }

    pub fn num_background(&self) -> usize {
        self.count(Label::Background)
    }

    pub fn num_ignored(&self) -> usize {
        self.count(Label::Ignore)
    }
}

// ─── AnchorTargetLayer ────────────────────────────────────────────────────────
/// Anchor assignment for training. Built once per configuration;
/// `assign` is a pure function of its arguments and the RNG.
#[derive(Debug, Clone)]
pub struct AnchorTargetLayer {
    anchors:     AnchorGenerator,
    num_classes: usize,
    regression:  RegressionMode,
    cfg:         AnchorTargetConfig,
}

impl AnchorTargetLayer {
    pub fn new(cfg: &CtpnConfig) -> Result<Self, CtpnError> {
        cfg.validate()?;
        Ok(Self {
            anchors:     AnchorGenerator::from_config(cfg)?,
            num_classes: cfg.num_classes,
            regression:  cfg.regression,
            cfg:         cfg.train.clone(),
        })
    }

    pub fn anchors(&self) -> &AnchorGenerator {
        &self.anchors
    }

    /// Assign labels, regression targets and loss weights to every anchor.
    ///
    /// `cls_score` only contributes its shape [1, H, W, A·C]. The RNG
    /// drives positive/negative subsampling; pass a seeded `StdRng`
    /// for reproducible targets.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        cls_score: ArrayView4<'_, f32>,
        gt_boxes:  &[GtBox],
        im_info:   &ImageInfo,
        rng:       &mut R,
    ) -> Result<AnchorTargets, CtpnError> {
        let (height, width) = self.check_shape(cls_score.shape())?;
        let num_anchors = self.anchors.num_anchors();

        // ── Step 1: all anchors in flat (row, col, anchor) order ─────────────
        let all_anchors = self.anchors.shifted_anchors(height, width);
        let total = all_anchors.len();

        let mut labels          = Array1::<i32>::from_elem(total, Label::Ignore.value());
        let mut bbox_targets    = Array2::<f32>::zeros((total, 4));
        let mut inside_weights  = Array2::<f32>::zeros((total, 4));
        let mut outside_weights = Array2::<f32>::zeros((total, 4));

        // ── Step 2: border policy ─────────────────────────────────────────────
        // `considered` holds flat indices in ascending order; `matched`
        // holds the geometry used for IoU matching.
        let (considered, matched): (Vec<usize>, Vec<BBox>) = match self.cfg.border_policy {
            BorderPolicy::Ignore => all_anchors
                .iter()
                .enumerate()
                .filter(|(_, a)| is_inside(a, im_info, self.cfg.allowed_border))
                .map(|(i, a)| (i, *a))
                .unzip(),
            BorderPolicy::Clip => all_anchors
                .iter()
                .enumerate()
                .map(|(i, a)| (i, clip(a, im_info)))
                .unzip(),
        };

        let gts: Vec<GtBox> = gt_boxes
            .iter()
            .filter(|g| {
                let keep = !g.bbox.is_degenerate();
                if !keep {
                    tracing::warn!("Skipping degenerate ground-truth box {:?}", g.bbox);
                }
                keep
            })
            .copied()
            .collect();
        let gt_bboxes: Vec<BBox> = gts.iter().map(|g| g.bbox).collect();

        tracing::debug!(
            "Anchor targets: grid {}x{}x{}, {} anchors considered, {} ground truths",
            height, width, num_anchors, considered.len(), gts.len(),
        );

        // ── Step 3: IoU matrix [considered, gt] ───────────────────────────────
        let ov = overlaps(&matched, &gt_bboxes);

        // Best ground truth per anchor (first max wins)
        let mut argmax_gt = vec![0usize; considered.len()];
        let mut max_ov    = vec![0.0f32; considered.len()];
        for (n, row) in ov.outer_iter().enumerate() {
            for (g, &v) in row.iter().enumerate() {
                if v > max_ov[n] {
                    max_ov[n] = v;
                    argmax_gt[n] = g;
                }
            }
        }

        // ── Step 4: labels ────────────────────────────────────────────────────
        // Background first so forced and threshold positives override it.
        for (n, &idx) in considered.iter().enumerate() {
            if max_ov[n] <= self.cfg.bg_overlap {
                labels[idx] = Label::Background.value();
            }
        }

        // Each ground truth keeps its best anchor; lowest index wins ties
        // because `considered` is ascending and the comparison is strict.
        for g in 0..gts.len() {
            let mut best: Option<(usize, f32)> = None;
            for n in 0..considered.len() {
                let v = ov[[n, g]];
                if v > 0.0 && best.map_or(true, |(_, b)| v > b) {
                    best = Some((n, v));
                }
            }
            if let Some((n, _)) = best {
                labels[considered[n]] = Label::Foreground.value();
            }
        }

        for (n, &idx) in considered.iter().enumerate() {
            if max_ov[n] >= self.cfg.fg_overlap && !gts.is_empty() {
                labels[idx] = Label::Foreground.value();
            }
        }

        // ── Step 5: subsampling ───────────────────────────────────────────────
        let num_fg = subsample(&mut labels, Label::Foreground, self.cfg.positive_cap(), rng);
        let num_bg = subsample(
            &mut labels,
            Label::Background,
            self.cfg.negative_cap(num_fg),
            rng,
        );

        // ── Step 6: regression targets for positives ──────────────────────────
        for (n, &idx) in considered.iter().enumerate() {
            if labels[idx] != Label::Foreground.value() {
                continue;
            }
            let delta = encode(&all_anchors[idx], &gt_bboxes[argmax_gt[n]], self.regression)?;
            bbox_targets.row_mut(idx).assign(&Array1::from(delta.to_array().to_vec()));
        }

        // ── Step 7: loss weights ──────────────────────────────────────────────
        let mask = self.regression.channel_mask();
        let inside: Vec<f32> = self
            .cfg
            .bbox_inside_weights
            .iter()
            .zip(mask.iter())
            .map(|(w, m)| w * m)
            .collect();

        let (pos_weight, neg_weight) = match self.cfg.positive_weight {
            None => {
                let num_examples = num_fg + num_bg;
                let w = if num_examples > 0 { 1.0 / num_examples as f32 } else { 0.0 };
                (w, w)
            }
            Some(p) => (
                if num_fg > 0 { p / num_fg as f32 } else { 0.0 },
                if num_bg > 0 { (1.0 - p) / num_bg as f32 } else { 0.0 },
            ),
        };

        for (idx, &label) in labels.iter().enumerate() {
            if label == Label::Foreground.value() {
                for (c, &w) in inside.iter().enumerate() {
                    inside_weights[[idx, c]] = w;
                }
                outside_weights.row_mut(idx).fill(pos_weight);
            } else if label == Label::Background.value() {
                outside_weights.row_mut(idx).fill(neg_weight);
            }
        }

        tracing::debug!(
            "Anchor targets: {} foreground, {} background, {} ignored",
            num_fg, num_bg, total - num_fg - num_bg,
        );

        Ok(AnchorTargets {
            labels,
            bbox_targets,
            inside_weights,
            outside_weights,
            height,
            width,
            num_anchors,
        })
    }

    /// Validate [1, H, W, A·C] and return (H, W).
    fn check_shape(&self, shape: &[usize]) -> Result<(usize, usize), CtpnError> {
        let channels = self.anchors.num_anchors() * self.num_classes;
        if shape.len() != 4 || shape[0] != 1 || shape[3] != channels {
            return Err(CtpnError::shape(
                "rpn_cls_score",
                format!("[1, H, W, {channels}]"),
                shape,
            ));
        }
        Ok((shape[1], shape[2]))
    }
}

/// Randomly demote anchors carrying `label` to ignore until at most
/// `cap` remain. Returns how many are left.
fn subsample<R: Rng + ?Sized>(
    labels: &mut Array1<i32>,
    label:  Label,
    cap:    usize,
    rng:    &mut R,
) -> usize {
    let indices: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|&(_, &l)| l == label.value())
        .map(|(i, _)| i)
        .collect();

    if indices.len() <= cap {
        return indices.len();
    }

    let excess = indices.len() - cap;
    for pos in rand::seq::index::sample(rng, indices.len(), excess).iter() {
        labels[indices[pos]] = Label::Ignore.value();
    }
    cap
}
