// ============================================================
// Layer 4: Proposal Layer (inference path)
// ============================================================
// Converts the dense head outputs of one image into a short,
// variable-length list of text proposals:
//
//   Step 1: Regenerate the H×W×A anchors (same order as training)
//   Step 2: Decode the regression offsets onto the anchors
//   Step 3: Clip to the image
//   Step 4: Drop boxes under the minimum size or score threshold
//   Step 5: Stable sort by foreground score, keep pre_nms_top_n
//   Step 6: Greedy NMS, keep post_nms_top_n
//
// Nothing surviving is a normal outcome: the result is an
// empty Vec.
//
// Reference: Ren et al. (2015) Faster R-CNN §3.3
//            Tian et al. (2016) CTPN §3.1

use ndarray::{Array2, ArrayView4};

use crate::domain::{
    boxes::{BBox, BoxDelta, ImageInfo, Proposal},
    config::{CtpnConfig, ProposalConfig, RegressionMode},
    error::CtpnError,
};
use crate::rpn::{
    anchors::AnchorGenerator,
    geometry::{clip, decode, filter_min_size},
    nms::nms,
};

/// Class index of "text" inside each anchor's C-slot
const FOREGROUND_CLASS: usize = 1;

/// Proposal decoding for inference. Stateless apart from the
/// configuration captured at construction.
#[derive(Debug, Clone)]
pub struct ProposalLayer {
    anchors:     AnchorGenerator,
    num_classes: usize,
    regression:  RegressionMode,
    cfg:         ProposalConfig,
}

struct Candidate {
    bbox:  BBox,
    score: f32,
    delta: BoxDelta,
}

impl ProposalLayer {
    pub fn new(cfg: &CtpnConfig) -> Result<Self, CtpnError> {
        cfg.validate()?;
        Ok(Self {
            anchors:     AnchorGenerator::from_config(cfg)?,
            num_classes: cfg.num_classes,
            regression:  cfg.regression,
            cfg:         cfg.test.clone(),
        })
    }

    pub fn anchors(&self) -> &AnchorGenerator {
        &self.anchors
    }

    /// Decode `[1, H, W, A·C]` class probabilities and `[1, H, W, A·4]`
    /// offsets into proposals, best score first.
    pub fn propose(
        &self,
        cls_prob:  ArrayView4<'_, f32>,
        bbox_pred: ArrayView4<'_, f32>,
        im_info:   &ImageInfo,
    ) -> Result<Vec<Proposal>, CtpnError> {
        let (height, width) = self.check_shapes(cls_prob.shape(), bbox_pred.shape())?;
        let num_anchors = self.anchors.num_anchors();
        let anchors = self.anchors.shifted_anchors(height, width);
        let min_size = self.cfg.min_size * im_info.scale;

        // ── Steps 1–4: decode, clip, filter ──────────────────────────────────
        let mut candidates: Vec<Candidate> = Vec::new();
        for row in 0..height {
            for col in 0..width {
                for k in 0..num_anchors {
                    let score = cls_prob[[0, row, col, k * self.num_classes + FOREGROUND_CLASS]];
                    if !score.is_finite() || score < self.cfg.score_threshold {
                        continue;
                    }

                    let base = k * 4;
                    let delta = BoxDelta::new(
                        bbox_pred[[0, row, col, base]],
                        bbox_pred[[0, row, col, base + 1]],
                        bbox_pred[[0, row, col, base + 2]],
                        bbox_pred[[0, row, col, base + 3]],
                    );

                    let anchor = &anchors[self.anchors.flat_index(row, col, k, width)];
                    let bbox = clip(&decode(anchor, &delta, self.regression), im_info);
                    if !filter_min_size(&bbox, min_size) {
                        continue;
                    }
                    candidates.push(Candidate { bbox, score, delta });
                }
            }
        }
        let decoded = candidates.len();

        // ── Step 5: stable sort, descending score ────────────────────────────
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        if self.cfg.pre_nms_top_n > 0 {
            candidates.truncate(self.cfg.pre_nms_top_n);
        }

        // ── Step 6: NMS ───────────────────────────────────────────────────────
        let boxes: Vec<BBox> = candidates.iter().map(|c| c.bbox).collect();
        let mut keep = nms(&boxes, self.cfg.nms_threshold);
        if self.cfg.post_nms_top_n > 0 {
            keep.truncate(self.cfg.post_nms_top_n);
        }

        let proposals: Vec<Proposal> = keep
            .into_iter()
            .map(|i| {
                let c = &candidates[i];
                Proposal { image_index: 0, bbox: c.bbox, score: c.score, delta: c.delta }
            })
            .collect();

        tracing::debug!(
            "Proposals: grid {}x{}x{}, {} decoded, {} after NMS",
            height, width, num_anchors, decoded, proposals.len(),
        );

        Ok(proposals)
    }

    /// Validate both head outputs against the anchor layout; return (H, W).
    fn check_shapes(&self, cls: &[usize], bbox: &[usize]) -> Result<(usize, usize), CtpnError> {
        let a = self.anchors.num_anchors();
        let cls_channels = a * self.num_classes;
        if cls.len() != 4 || cls[0] != 1 || cls[3] != cls_channels {
            return Err(CtpnError::shape("rpn_cls_prob", format!("[1, H, W, {cls_channels}]"), cls));
        }
        let (h, w) = (cls[1], cls[2]);
        if bbox.len() != 4 || bbox[0] != 1 || bbox[1] != h || bbox[2] != w || bbox[3] != a * 4 {
            return Err(CtpnError::shape(
                "rpn_bbox_pred",
                format!("[1, {h}, {w}, {}]", a * 4),
                bbox,
            ));
        }
        Ok((h, w))
    }
}

/// Stack proposals into the `[K, 5]` ROI blob (image index first).
pub fn rois_array(proposals: &[Proposal]) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((proposals.len(), 5));
    for (i, p) in proposals.iter().enumerate() {
        for (j, v) in p.roi().into_iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    out
}

/// Stack the matched regression offsets into a `[K, 4]` array.
pub fn deltas_array(proposals: &[Proposal]) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((proposals.len(), 4));
    for (i, p) in proposals.iter().enumerate() {
        for (j, v) in p.delta.to_array().into_iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    out
}
