// ============================================================
// Layer 2: ProbeUseCase
// ============================================================
// Builds the full network with freshly initialised weights and
// pushes one synthetic image through both entry points:
//
//   Step 1: Build Ctpn on the NdArray backend      (Layer 5 - ml)
//   Step 2: Fill a [1, 3, H, W] image with noise
//   Step 3: inference()  → proposal count
//   Step 4: build_loss() → loss scalars (if ground truth given)
//   Step 5: Optionally dump the head outputs       (Layer 4 - data)
//
// The dump can be fed straight back into `propose` / `assign`.
//
// Reference: Burn Book §3 (Building Blocks)

use anyhow::{ensure, Result};
use burn::{backend::NdArray, prelude::*};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;

use crate::data::dump::TensorDumpLoader;
use crate::domain::{
    boxes::{GtBox, ImageInfo},
    config::CtpnConfig,
    traits::RpnInput,
};
use crate::ml::model::{tensor_to_array4, Ctpn};

type ProbeBackend = NdArray;

#[derive(Debug, Clone, Serialize)]
pub struct LossReport {
    pub total:          f32,
    pub model:          f32,
    pub classification: f32,
    pub regression:     f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    /// [H, W] of the input image
    pub image:         [usize; 2],
    /// [h, w] of the head outputs
    pub grid:          [usize; 2],
    pub num_proposals: usize,
    pub best_score:    Option<f32>,
    pub loss:          Option<LossReport>,
}

#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub height:   usize,
    pub width:    usize,
    pub seed:     u64,
    pub gt_boxes: Vec<GtBox>,
    pub dump:     Option<PathBuf>,
}

pub struct ProbeUseCase {
    config: CtpnConfig,
}

impl ProbeUseCase {
    pub fn new(config: CtpnConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self, req: &ProbeRequest) -> Result<ProbeReport> {
        let stride = self.config.feat_stride as usize;
        ensure!(
            req.height >= stride && req.width >= stride,
            "image must be at least {stride}x{stride} pixels, got {}x{}",
            req.height,
            req.width
        );

        // ── Step 1: network ───────────────────────────────────────────────────
        let device = Default::default();
        tracing::info!("Building CTPN ({} backbone)", self.config.backbone);
        let net = Ctpn::<ProbeBackend>::new(self.config.clone(), &device)?;

        // ── Step 2: synthetic image ───────────────────────────────────────────
        let mut rng = StdRng::seed_from_u64(req.seed);
        let pixels: Vec<f32> = (0..3 * req.height * req.width).map(|_| rng.gen::<f32>()).collect();
        let images = Tensor::<ProbeBackend, 1>::from_floats(pixels.as_slice(), &device)
            .reshape([1, 3, req.height, req.width]);
        let im_info = ImageInfo::new(req.height as f32, req.width as f32, 1.0);

        // ── Step 3: inference ─────────────────────────────────────────────────
        let proposals = net.inference(images.clone(), &im_info)?;
        tracing::info!("{} proposals", proposals.len());

        // ── Step 4: loss ──────────────────────────────────────────────────────
        let loss = if req.gt_boxes.is_empty() {
            None
        } else {
            let l = net.build_loss(images.clone(), &req.gt_boxes, &im_info, &mut rng, None)?;
            let report = LossReport {
                total:          l.total.into_scalar().elem::<f32>(),
                model:          l.model.into_scalar().elem::<f32>(),
                classification: l.classification.into_scalar().elem::<f32>(),
                regression:     l.regression.into_scalar().elem::<f32>(),
            };
            tracing::info!(
                "Loss: total {:.4} (cls {:.4}, reg {:.4})",
                report.total, report.classification, report.regression,
            );
            Some(report)
        };

        // ── Step 5: heads → dump ──────────────────────────────────────────────
        let out = net.forward(images)?;
        let [_, h, w, _] = out.cls_prob.dims();
        if let Some(path) = &req.dump {
            let input = RpnInput {
                cls_prob:  tensor_to_array4(out.cls_prob)?,
                bbox_pred: tensor_to_array4(out.bbox_pred)?,
                im_info,
                gt_boxes:  req.gt_boxes.clone(),
            };
            TensorDumpLoader::write(path, &input)?;
            tracing::info!("Head outputs written to '{}'", path.display());
        }

        Ok(ProbeReport {
            image:         [req.height, req.width],
            grid:          [h, w],
            num_proposals: proposals.len(),
            best_score:    proposals.first().map(|p| p.score),
            loss,
        })
    }
}
