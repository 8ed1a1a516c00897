// ============================================================
// Layer 4: Region Proposal Layer
// ============================================================
// The anchor machinery that sits between the dense network
// outputs and the sparse list of text proposals. Everything in
// here works on plain ndarray arrays, never on Burn tensors:
//
//   anchors.rs        - base anchor shapes + grid tiling
//   geometry.rs       - IoU, delta encode/decode, clipping
//   nms.rs            - greedy non-maximum suppression
//   anchor_target.rs  - training labels, targets, loss weights
//   proposal.rs       - inference-time proposal decoding
//
// Both layers are built once from a CtpnConfig and are then
// pure functions of their inputs (plus an explicit RNG for
// training-time subsampling), so independent images can be
// processed in parallel.
//
// Reference: Ren et al. (2015) Faster R-CNN
//            Tian et al. (2016) CTPN

/// Base anchor generation and tiling
pub mod anchors;

/// Box overlap and regression-delta helpers
pub mod geometry;

/// Greedy non-maximum suppression
pub mod nms;

/// Anchor labelling for training
pub mod anchor_target;

/// Proposal decoding for inference
pub mod proposal;
