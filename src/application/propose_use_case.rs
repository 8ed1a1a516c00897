// ============================================================
// Layer 2: ProposeUseCase
// ============================================================
// Runs the inference half of the RPN over a tensor dump:
//
//   Step 1: Load head outputs          (Layer 4 - data)
//   Step 2: Decode + NMS proposals     (Layer 4 - rpn)
//   Step 3: Package the result         (for Layer 1 to print)
//
// Reference: Tian et al. (2016) CTPN §3.1

use anyhow::Result;
use serde::Serialize;

use crate::domain::{
    boxes::{ImageInfo, Proposal},
    config::CtpnConfig,
    traits::RpnInputSource,
};
use crate::rpn::proposal::ProposalLayer;

/// What `propose` hands back to the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalReport {
    pub im_info:   ImageInfo,
    /// [H, W, A] of the head outputs
    pub grid:      [usize; 3],
    pub proposals: Vec<Proposal>,
}

pub struct ProposeUseCase {
    layer: ProposalLayer,
}

impl ProposeUseCase {
    pub fn new(config: &CtpnConfig) -> Result<Self> {
        Ok(Self { layer: ProposalLayer::new(config)? })
    }

    pub fn execute(&self, source: &dyn RpnInputSource) -> Result<ProposalReport> {
        // ── Step 1: load ──────────────────────────────────────────────────────
        let input = source.load_input()?;
        let shape = input.cls_prob.shape();
        let grid = [shape[1], shape[2], self.layer.anchors().num_anchors()];

        // ── Step 2: decode ────────────────────────────────────────────────────
        let proposals = self
            .layer
            .propose(input.cls_prob.view(), input.bbox_pred.view(), &input.im_info)?;

        tracing::info!(
            "{} proposals from a {}x{} grid ({} anchors/cell)",
            proposals.len(), grid[0], grid[1], grid[2],
        );

        Ok(ProposalReport { im_info: input.im_info, grid, proposals })
    }
}
