// ============================================================
// Layer 5: CTPN Network
// ============================================================
// The full network, from image to head outputs:
//
//   backbone      [1, 3, H, W]     → [1, 512, h, w]   (h = H/16)
//   rpn_conv 3×3  + ReLU           → [1, 512, h, w]
//   row BiLSTM    + FC             → [1, 512, h, w]
//   bbox head 1×1                  → [1, h, w, A·4]   (NHWC)
//   cls  head 1×1                  → [1, h, w, A·C]   (NHWC)
//   softmax over each anchor's C-slot → cls_prob
//
// `Ctpn` wraps the model together with the anchor target layer
// and the proposal layer and exposes the two entry points the
// drivers use:
//
//   inference()  → Vec<Proposal>
//   build_loss() → RpnLoss { total, model, classification, regression }
//
// Head outputs are pulled back to host ndarray arrays at the
// boundary of the RPN layers.
//
// Reference: Tian et al. (2016) CTPN, Fig. 1
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, softmax},
};
use ndarray::Array4;
use rand::Rng;

use crate::domain::{
    boxes::{GtBox, ImageInfo, Proposal},
    config::{BackboneKind, CtpnConfig},
    error::CtpnError,
};
use crate::ml::{
    backbone::Backbone,
    bilstm::{RowBiLstm, RowBiLstmConfig},
    loss::{assemble_loss, RpnLoss},
};
use crate::rpn::{anchor_target::AnchorTargetLayer, proposal::ProposalLayer};

// ─── Model configuration ──────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct CtpnModelConfig {
    pub backbone:     BackboneKind,
    /// Anchors per feature-map cell (number of anchor heights)
    pub num_anchors:  usize,
    #[config(default = 2)]
    pub num_classes:  usize,
    #[config(default = 512)]
    pub rpn_channels: usize,
    #[config(default = 128)]
    pub lstm_hidden:  usize,
}

impl CtpnModelConfig {
    pub fn from_ctpn(cfg: &CtpnConfig) -> Self {
        Self::new(cfg.backbone, cfg.num_anchors()).with_num_classes(cfg.num_classes)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> CtpnModel<B> {
        let backbone = Backbone::new(self.backbone, device);
        let rpn_conv = Conv2dConfig::new([backbone.out_channels(), self.rpn_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let bilstm = RowBiLstmConfig::new(self.rpn_channels, self.rpn_channels)
            .with_d_hidden(self.lstm_hidden)
            .init(device);
        let bbox_head = Conv2dConfig::new([self.rpn_channels, self.num_anchors * 4], [1, 1]).init(device);
        let cls_head = Conv2dConfig::new([self.rpn_channels, self.num_anchors * self.num_classes], [1, 1])
            .init(device);

        CtpnModel {
            backbone,
            rpn_conv,
            bilstm,
            bbox_head,
            cls_head,
            num_anchors: self.num_anchors,
            num_classes: self.num_classes,
        }
    }
}

// ─── Model ────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct CtpnModel<B: Backend> {
    pub backbone:    Backbone<B>,
    pub rpn_conv:    Conv2d<B>,
    pub bilstm:      RowBiLstm<B>,
    pub bbox_head:   Conv2d<B>,
    pub cls_head:    Conv2d<B>,
    pub num_anchors: usize,
    pub num_classes: usize,
}

/// Head outputs, all NHWC.
#[derive(Debug, Clone)]
pub struct CtpnOutput<B: Backend> {
    /// [1, h, w, A·4]
    pub bbox_pred: Tensor<B, 4>,
    /// [1, h, w, A·C] raw logits
    pub cls_score: Tensor<B, 4>,
    /// [1, h, w, A·C] per-anchor softmax of `cls_score`
    pub cls_prob:  Tensor<B, 4>,
}

impl<B: Backend> CtpnModel<B> {
    /// images: [N, 3, H, W] → head outputs for the N·h·w·A anchors
    pub fn forward(&self, images: Tensor<B, 4>) -> CtpnOutput<B> {
        let features = self.backbone.forward(images);
        let features = relu(self.rpn_conv.forward(features));
        let features = self.bilstm.forward(features);

        let bbox_pred = self.bbox_head.forward(features.clone()).permute([0, 2, 3, 1]);
        let cls_score = self.cls_head.forward(features).permute([0, 2, 3, 1]);

        let [n, h, w, c] = cls_score.dims();
        let cls_prob = softmax(
            cls_score.clone().reshape([n * h * w * self.num_anchors, self.num_classes]),
            1,
        )
        .reshape([n, h, w, c]);

        CtpnOutput { bbox_pred, cls_score, cls_prob }
    }

    /// L2 penalty `wd · Σ‖w‖² / 2` over every conv and fully-connected
    /// kernel. Biases and the LSTM gates are not penalised.
    pub fn weight_penalty(&self, weight_decay: f32) -> Tensor<B, 1> {
        let mut kernels = self.backbone.conv_weights();
        kernels.extend([
            self.rpn_conv.weight.val(),
            self.bbox_head.weight.val(),
            self.cls_head.weight.val(),
        ]);
        let fc = self.bilstm.fc.weight.val();

        let sum_sq = kernels
            .into_iter()
            .map(|w| (w.clone() * w).sum())
            .fold((fc.clone() * fc).sum(), |acc, t| acc + t);
        sum_sq * (0.5 * weight_decay)
    }
}

/// Copy a 4-D tensor back to the host.
pub fn tensor_to_array4<B: Backend>(tensor: Tensor<B, 4>) -> Result<Array4<f32>, CtpnError> {
    let [a, b, c, d] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CtpnError::TensorData(format!("{e:?}")))?;
    Array4::from_shape_vec((a, b, c, d), values).map_err(|e| CtpnError::TensorData(e.to_string()))
}

// ─── Ctpn ─────────────────────────────────────────────────────────────────────
/// The trainable network plus its anchor layers, for one configuration.
#[derive(Debug)]
pub struct Ctpn<B: Backend> {
    model:          CtpnModel<B>,
    config:         CtpnConfig,
    anchor_targets: AnchorTargetLayer,
    proposals:      ProposalLayer,
}

impl<B: Backend> Ctpn<B> {
    /// Build a freshly initialised network for `config`.
    pub fn new(config: CtpnConfig, device: &B::Device) -> Result<Self, CtpnError> {
        config.validate()?;
        let model = CtpnModelConfig::from_ctpn(&config).init(device);
        Self::from_model(model, config)
    }

    /// Wrap an existing model (e.g. with weights restored by the caller).
    pub fn from_model(model: CtpnModel<B>, config: CtpnConfig) -> Result<Self, CtpnError> {
        config.validate()?;
        if model.backbone.stride() != config.feat_stride {
            return Err(CtpnError::config(format!(
                "feat_stride {} does not match the backbone stride {}",
                config.feat_stride,
                model.backbone.stride()
            )));
        }
        if model.num_anchors != config.num_anchors() || model.num_classes != config.num_classes {
            return Err(CtpnError::config(format!(
                "model heads are built for {} anchors × {} classes, configuration has {} × {}",
                model.num_anchors,
                model.num_classes,
                config.num_anchors(),
                config.num_classes
            )));
        }

        tracing::debug!(
            "CTPN ready: backbone={}, {} anchors/cell, stride {}",
            config.backbone, config.num_anchors(), config.feat_stride,
        );

        Ok(Self {
            anchor_targets: AnchorTargetLayer::new(&config)?,
            proposals:      ProposalLayer::new(&config)?,
            model,
            config,
        })
    }

    pub fn model(&self) -> &CtpnModel<B> {
        &self.model
    }

    pub fn into_model(self) -> CtpnModel<B> {
        self.model
    }

    pub fn config(&self) -> &CtpnConfig {
        &self.config
    }

    /// Run the heads on one image, checking the batch-of-one contract.
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<CtpnOutput<B>, CtpnError> {
        let dims = images.dims();
        if dims[0] != 1 || dims[1] != 3 {
            return Err(CtpnError::shape("img_input", "[1, 3, H, W]", &dims));
        }
        Ok(self.model.forward(images))
    }

    /// Text proposals for one image.
    pub fn inference(&self, images: Tensor<B, 4>, im_info: &ImageInfo) -> Result<Vec<Proposal>, CtpnError> {
        let out = self.forward(images)?;
        let cls_prob = tensor_to_array4(out.cls_prob)?;
        let bbox_pred = tensor_to_array4(out.bbox_pred)?;
        self.proposals.propose(cls_prob.view(), bbox_pred.view(), im_info)
    }

    /// Training losses for one image.
    ///
    /// `regularization` is added to the model loss as-is. Without one,
    /// the weight-decay penalty of `train.weight_decay` is used.
    pub fn build_loss<R: Rng + ?Sized>(
        &self,
        images:         Tensor<B, 4>,
        gt_boxes:       &[GtBox],
        im_info:        &ImageInfo,
        rng:            &mut R,
        regularization: Option<Tensor<B, 1>>,
    ) -> Result<RpnLoss<B>, CtpnError> {
        let out = self.forward(images)?;
        let scores = tensor_to_array4(out.cls_score.clone())?;
        let targets = self.anchor_targets.assign(scores.view(), gt_boxes, im_info, rng)?;

        let weight_decay = self.config.train.weight_decay;
        let regularization = regularization
            .or_else(|| (weight_decay > 0.0).then(|| self.model.weight_penalty(weight_decay)));
        assemble_loss(out.cls_score, out.bbox_pred, &targets, regularization)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::boxes::BBox;
    use rand::{rngs::StdRng, SeedableRng};

    type TestBackend = burn::backend::NdArray;

    fn small_config() -> CtpnConfig {
        CtpnConfig { anchor_heights: vec![16, 32], ..Default::default() }
    }

    #[test]
    fn test_head_shapes_and_probabilities() {
        let device = Default::default();
        let net = Ctpn::<TestBackend>::new(small_config(), &device).unwrap();
        let images = Tensor::<TestBackend, 4>::ones([1, 3, 32, 48], &device);

        let out = net.forward(images).unwrap();
        assert_eq!(out.bbox_pred.dims(), [1, 2, 3, 8]);
        assert_eq!(out.cls_score.dims(), [1, 2, 3, 4]);

        let prob = tensor_to_array4(out.cls_prob).unwrap();
        for row in 0..2 {
            for col in 0..3 {
                for k in 0..2 {
                    let s = prob[[0, row, col, 2 * k]] + prob[[0, row, col, 2 * k + 1]];
                    assert!((s - 1.0).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_inference_and_loss_run_end_to_end() {
        let device = Default::default();
        let net = Ctpn::<TestBackend>::new(small_config(), &device).unwrap();
        let im_info = ImageInfo::new(32.0, 48.0, 1.0);

        let images = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 48], &device);
        let proposals = net.inference(images.clone(), &im_info).unwrap();
        assert!(proposals.len() <= 2 * 3 * 2);
        assert!(proposals.windows(2).all(|p| p[0].score >= p[1].score));

        let gt = [GtBox::new(BBox::new(16.0, 4.0, 31.0, 27.0), 1)];
        let mut rng = StdRng::seed_from_u64(1);
        let loss = net.build_loss(images, &gt, &im_info, &mut rng, None).unwrap();
        let total = loss.total.into_scalar().elem::<f32>();
        assert!(total.is_finite() && total > 0.0);
    }

    #[test]
    fn test_weight_decay_enters_total_loss() {
        let device = Default::default();
        let net = Ctpn::<TestBackend>::new(small_config(), &device).unwrap();
        let im_info = ImageInfo::new(32.0, 32.0, 1.0);
        let images = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        let gt = [GtBox::new(BBox::new(0.0, 1.0, 15.0, 15.0), 1)];

        let penalty = net.model().weight_penalty(0.0005).into_scalar().elem::<f32>();
        let doubled = net.model().weight_penalty(0.001).into_scalar().elem::<f32>();
        assert!(penalty > 0.0);
        assert!((doubled - 2.0 * penalty).abs() < 1e-4 * doubled);

        let mut rng = StdRng::seed_from_u64(0);
        let loss = net.build_loss(images.clone(), &gt, &im_info, &mut rng, None).unwrap();
        let total = loss.total.into_scalar().elem::<f32>();
        let model = loss.model.into_scalar().elem::<f32>();
        assert!((total - model - penalty).abs() < 1e-3 * total.max(1.0));

        // an explicit term replaces the built-in penalty
        let mut rng = StdRng::seed_from_u64(0);
        let reg = Tensor::<TestBackend, 1>::from_floats([0.0], &device);
        let loss = net.build_loss(images, &gt, &im_info, &mut rng, Some(reg)).unwrap();
        let total = loss.total.into_scalar().elem::<f32>();
        let model = loss.model.into_scalar().elem::<f32>();
        assert!((total - model).abs() < 1e-6);
    }

    #[test]
    fn test_zero_weight_decay_adds_nothing() {
        let device = Default::default();
        let mut cfg = small_config();
        cfg.train.weight_decay = 0.0;
        let net = Ctpn::<TestBackend>::new(cfg, &device).unwrap();
        let images = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        let mut rng = StdRng::seed_from_u64(0);

        let loss = net
            .build_loss(images, &[], &ImageInfo::new(32.0, 32.0, 1.0), &mut rng, None)
            .unwrap();
        let total = loss.total.into_scalar().elem::<f32>();
        let model = loss.model.into_scalar().elem::<f32>();
        assert_eq!(total, model);
    }

    #[test]
    fn test_batch_of_two_rejected() {
        let device = Default::default();
        let net = Ctpn::<TestBackend>::new(small_config(), &device).unwrap();
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        assert!(matches!(
            net.inference(images, &ImageInfo::new(32.0, 32.0, 1.0)),
            Err(CtpnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_stride_mismatch_rejected() {
        let device = Default::default();
        let cfg = CtpnConfig { feat_stride: 8, ..small_config() };
        assert!(matches!(
            Ctpn::<TestBackend>::new(cfg, &device),
            Err(CtpnError::Configuration(_))
        ));
    }
}
