// ============================================================
// Layer 5: RPN Loss
// ============================================================
// Reduces the head outputs and the anchor targets of one image
// to four scalars:
//
//   classification = mean softmax cross-entropy over anchors
//                    whose label is not -1
//   regression     = Σ outside · smoothL1(inside · (pred - target))
//                    ─────────────────────────────────────────────
//                                 num_fg + 1
//   model          = classification + regression
//   total          = model + regularization (if supplied)
//
// smoothL1 with σ² = 9:
//   0.5 · σ² · x²      if |x| < 1/σ²
//   |x| - 0.5 / σ²     otherwise
//
// Reference: Girshick (2015) Fast R-CNN eq. 3
//            Burn Book §5 (Losses)

use burn::{nn::loss::CrossEntropyLossConfig, prelude::*};
use ndarray::Array2;

use crate::domain::error::CtpnError;
use crate::rpn::anchor_target::{AnchorTargets, Label};

pub const SMOOTH_L1_SIGMA2: f32 = 9.0;

/// The four scalars handed to the training driver.
#[derive(Debug, Clone)]
pub struct RpnLoss<B: Backend> {
    pub total:          Tensor<B, 1>,
    pub model:          Tensor<B, 1>,
    pub classification: Tensor<B, 1>,
    pub regression:     Tensor<B, 1>,
}

/// Element-wise smooth-L1 of `deltas`.
pub fn smooth_l1<B: Backend, const D: usize>(deltas: Tensor<B, D>, sigma2: f32) -> Tensor<B, D> {
    let abs = deltas.clone().abs();
    let quadratic = abs.clone().lower_elem(1.0 / sigma2).float();
    let linear = quadratic.clone().neg() + 1.0;

    deltas.clone() * deltas * (0.5 * sigma2) * quadratic + (abs - 0.5 / sigma2) * linear
}

/// Gather `rows` of a host array into a `[rows.len(), 4]` tensor.
fn gather_rows<B: Backend>(src: &Array2<f32>, rows: &[usize], device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f32> = rows
        .iter()
        .flat_map(|&r| src.row(r).to_vec())
        .collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows.len(), 4])
}

/// Combine classification and regression losses for one image.
///
/// cls_score: [1, H, W, A·C] raw logits
/// bbox_pred: [1, H, W, A·4] predicted offsets
pub fn assemble_loss<B: Backend>(
    cls_score:      Tensor<B, 4>,
    bbox_pred:      Tensor<B, 4>,
    targets:        &AnchorTargets,
    regularization: Option<Tensor<B, 1>>,
) -> Result<RpnLoss<B>, CtpnError> {
    let device = cls_score.device();
    let a = targets.num_anchors;
    let (h, w) = (targets.height, targets.width);
    let n = targets.len();

    let cls_dims = cls_score.dims();
    if cls_dims[0] != 1 || cls_dims[1] != h || cls_dims[2] != w || a == 0 || cls_dims[3] % a != 0 {
        return Err(CtpnError::shape("rpn_cls_score", format!("[1, {h}, {w}, {a}·C]"), &cls_dims));
    }
    let bbox_dims = bbox_pred.dims();
    if bbox_dims != [1, h, w, a * 4] {
        return Err(CtpnError::shape("rpn_bbox_pred", format!("[1, {h}, {w}, {}]", a * 4), &bbox_dims));
    }
    let num_classes = cls_dims[3] / a;

    // ── Anchors that take part in the loss ───────────────────────────────────
    let keep: Vec<usize> = targets
        .labels
        .iter()
        .enumerate()
        .filter(|&(_, &l)| l != Label::Ignore.value())
        .map(|(i, _)| i)
        .collect();
    let num_fg = targets.num_foreground();

    let (classification, regression) = if keep.is_empty() {
        (Tensor::<B, 1>::zeros([1], &device), Tensor::<B, 1>::zeros([1], &device))
    } else {
        let keep_i32: Vec<i32> = keep.iter().map(|&i| i as i32).collect();
        let labels: Vec<i32> = keep.iter().map(|&i| targets.labels[i]).collect();
        let index = Tensor::<B, 1, Int>::from_ints(keep_i32.as_slice(), &device);

        // ── Classification: CE over kept anchors ─────────────────────────────
        let logits = cls_score.reshape([n, num_classes]).select(0, index.clone());
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &device);
        let ce = CrossEntropyLossConfig::new().init(&device);
        let classification = ce.forward(logits, labels);

        // ── Regression: weighted smooth-L1 ────────────────────────────────────
        let pred    = bbox_pred.reshape([n, 4]).select(0, index);
        let target  = gather_rows::<B>(&targets.bbox_targets, &keep, &device);
        let inside  = gather_rows::<B>(&targets.inside_weights, &keep, &device);
        let outside = gather_rows::<B>(&targets.outside_weights, &keep, &device);

        let per_anchor = smooth_l1((pred - target) * inside, SMOOTH_L1_SIGMA2) * outside;
        let regression = per_anchor.sum() / (num_fg as f32 + 1.0);

        (classification, regression)
    };

    let model = classification.clone() + regression.clone();
    let total = match regularization {
        Some(reg) => model.clone() + reg,
        None => model.clone(),
    };

    Ok(RpnLoss { total, model, classification, regression })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        boxes::{BBox, GtBox, ImageInfo},
        config::CtpnConfig,
    };
    use crate::rpn::anchor_target::AnchorTargetLayer;
    use ndarray::Array4;
    use rand::{rngs::StdRng, SeedableRng};

    type TestBackend = burn::backend::NdArray;
    type TestAutodiff = burn::backend::Autodiff<TestBackend>;

    fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    fn targets_for(gt: &[GtBox]) -> AnchorTargets {
        let cfg = CtpnConfig { anchor_heights: vec![16], ..Default::default() };
        let layer = AnchorTargetLayer::new(&cfg).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        layer
            .assign(Array4::<f32>::zeros((1, 2, 2, 2)).view(), gt, &ImageInfo::new(32.0, 32.0, 1.0), &mut rng)
            .unwrap()
    }

    #[test]
    fn test_smooth_l1_branches() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([0.05, -1.0, 0.0], &device);
        let y: Vec<f32> = smooth_l1(x, SMOOTH_L1_SIGMA2).into_data().to_vec().unwrap();
        assert!((y[0] - 0.011_25).abs() < 1e-5);
        assert!((y[1] - (1.0 - 0.5 / 9.0)).abs() < 1e-5);
        assert_eq!(y[2], 0.0);
    }

    #[test]
    fn test_no_ground_truth_has_zero_regression() {
        let device = Default::default();
        let targets = targets_for(&[]);
        let cls = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);
        let bbox = Tensor::<TestBackend, 4>::ones([1, 2, 2, 4], &device);

        let loss = assemble_loss(cls, bbox, &targets, None).unwrap();
        assert_eq!(scalar(loss.regression), 0.0);
        // uniform logits → ln 2
        assert!((scalar(loss.classification) - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_positive_anchor_drives_regression() {
        let device = Default::default();
        let targets = targets_for(&[GtBox::new(BBox::new(0.0, 1.0, 15.0, 15.0), 1)]);
        let cls = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);
        let bbox = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 4], &device);
        let reg = Tensor::<TestBackend, 1>::from_floats([0.5], &device);

        let loss = assemble_loss(cls, bbox, &targets, Some(reg)).unwrap();
        let regression = scalar(loss.regression);
        let model = scalar(loss.model);
        assert!(regression > 0.0);
        assert!((model - (scalar(loss.classification) + regression)).abs() < 1e-6);
        assert!((scalar(loss.total) - (model + 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_all_ignored_gives_zero_loss() {
        let device = Default::default();
        let mut targets = targets_for(&[]);
        targets.labels.fill(-1);
        let cls = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);
        let bbox = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 4], &device);

        let loss = assemble_loss(cls, bbox, &targets, None).unwrap();
        assert_eq!(scalar(loss.total), 0.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let device = Default::default();
        let targets = targets_for(&[]);
        let cls = Tensor::<TestBackend, 4>::zeros([1, 3, 2, 2], &device);
        let bbox = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 4], &device);
        assert!(assemble_loss(cls, bbox, &targets, None).is_err());
    }

    #[test]
    fn test_gradients_reach_both_heads() {
        let device = Default::default();
        let targets = targets_for(&[GtBox::new(BBox::new(0.0, 1.0, 15.0, 15.0), 1)]);
        let cls = Tensor::<TestAutodiff, 4>::zeros([1, 2, 2, 2], &device).require_grad();
        let bbox = Tensor::<TestAutodiff, 4>::zeros([1, 2, 2, 4], &device).require_grad();

        let loss = assemble_loss(cls.clone(), bbox.clone(), &targets, None).unwrap();
        let grads = loss.total.backward();
        assert!(cls.grad(&grads).is_some());
        assert!(bbox.grad(&grads).is_some());
    }
}
