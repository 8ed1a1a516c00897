// ============================================================
// Layer 2: AssignUseCase
// ============================================================
// Runs the training half of the RPN over a tensor dump and
// summarises the anchor targets:
//
//   Step 1: Load head outputs + ground truth   (Layer 4 - data)
//   Step 2: Label, encode, subsample anchors   (Layer 4 - rpn)
//   Step 3: Collect counts and positives       (for Layer 1)
//
// The seed makes the subsampling reproducible between runs.
//
// Reference: Ren et al. (2015) Faster R-CNN §3.1.2

use anyhow::Result;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use crate::domain::{
    boxes::{BBox, BoxDelta},
    config::CtpnConfig,
    traits::RpnInputSource,
};
use crate::rpn::anchor_target::{AnchorTargetLayer, Label};

/// One positive anchor with its regression target.
#[derive(Debug, Clone, Serialize)]
pub struct PositiveAnchor {
    /// Flat index in (row, col, anchor) order
    pub index:  usize,
    pub anchor: BBox,
    pub target: BoxDelta,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignReport {
    /// [H, W, A]
    pub grid:           [usize; 3],
    pub num_gt:         usize,
    pub num_foreground: usize,
    pub num_background: usize,
    pub num_ignored:    usize,
    pub positives:      Vec<PositiveAnchor>,
}

pub struct AssignUseCase {
    layer: AnchorTargetLayer,
    seed:  u64,
}

impl AssignUseCase {
    pub fn new(config: &CtpnConfig, seed: u64) -> Result<Self> {
        Ok(Self { layer: AnchorTargetLayer::new(config)?, seed })
    }

    pub fn execute(&self, source: &dyn RpnInputSource) -> Result<AssignReport> {
        // ── Step 1: load ──────────────────────────────────────────────────────
        let input = source.load_input()?;
        if input.gt_boxes.is_empty() {
            tracing::warn!("Tensor dump carries no ground truth; every sampled anchor is background");
        }

        // ── Step 2: assign ────────────────────────────────────────────────────
        let mut rng = StdRng::seed_from_u64(self.seed);
        let targets = self
            .layer
            .assign(input.cls_prob.view(), &input.gt_boxes, &input.im_info, &mut rng)?;

        // ── Step 3: summarise ─────────────────────────────────────────────────
        let anchors = self.layer.anchors().shifted_anchors(targets.height, targets.width);
        let positives: Vec<PositiveAnchor> = targets
            .labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == Label::Foreground.value())
            .map(|(i, _)| PositiveAnchor {
                index:  i,
                anchor: anchors[i],
                target: BoxDelta::from_slice(&targets.bbox_targets.row(i).to_vec()),
            })
            .collect();

        let report = AssignReport {
            grid:           [targets.height, targets.width, targets.num_anchors],
            num_gt:         input.gt_boxes.len(),
            num_foreground: targets.num_foreground(),
            num_background: targets.num_background(),
            num_ignored:    targets.num_ignored(),
            positives,
        };

        tracing::info!(
            "Assigned {} anchors: {} fg, {} bg, {} ignored",
            targets.len(), report.num_foreground, report.num_background, report.num_ignored,
        );
        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        boxes::{GtBox, ImageInfo},
        traits::RpnInput,
    };
    use ndarray::Array4;

    struct InMemory(RpnInput);

    impl RpnInputSource for InMemory {
        fn load_input(&self) -> Result<RpnInput> {
            Ok(self.0.clone())
        }
    }

    fn source(gt_boxes: Vec<GtBox>) -> InMemory {
        InMemory(RpnInput {
            cls_prob:  Array4::zeros((1, 2, 2, 2)),
            bbox_pred: Array4::zeros((1, 2, 2, 4)),
            im_info:   ImageInfo::new(32.0, 32.0, 1.0),
            gt_boxes,
        })
    }

    fn config() -> CtpnConfig {
        CtpnConfig { anchor_heights: vec![16], ..Default::default() }
    }

    #[test]
    fn test_single_gt_gives_one_positive() {
        let gt = vec![GtBox::new(BBox::new(0.0, 1.0, 15.0, 15.0), 1)];
        let report = AssignUseCase::new(&config(), 0).unwrap().execute(&source(gt)).unwrap();

        assert_eq!(report.grid, [2, 2, 1]);
        assert_eq!(report.num_foreground, 1);
        assert_eq!(report.num_background, 3);
        assert_eq!(report.positives[0].index, 0);
        assert!(report.positives[0].target.dy != 0.0);
    }

    #[test]
    fn test_same_seed_same_report() {
        let gt = vec![GtBox::new(BBox::new(0.0, 0.0, 31.0, 15.0), 1)];
        let uc = AssignUseCase::new(&config(), 7).unwrap();
        let a = uc.execute(&source(gt.clone())).unwrap();
        let b = uc.execute(&source(gt)).unwrap();
        assert_eq!(a.num_foreground, b.num_foreground);
        let idx = |r: &AssignReport| r.positives.iter().map(|p| p.index).collect::<Vec<_>>();
        assert_eq!(idx(&a), idx(&b));
    }

    #[test]
    fn test_no_ground_truth_has_no_positives() {
        let report = AssignUseCase::new(&config(), 0).unwrap().execute(&source(Vec::new())).unwrap();
        assert_eq!(report.num_foreground, 0);
        assert!(report.positives.is_empty());
    }
}
