// ============================================================
// Layer 4: Data Layer
// ============================================================
// Gets dense head outputs from disk into the ndarray arrays the
// RPN layers consume:
//
//   tensor dump (.json)
//       │
//       ▼
//   TensorDumpLoader  → parses JSON, checks shapes
//       │
//       ▼
//   RpnInput          → cls_prob, bbox_pred, im_info, gt_boxes
//
// Reference: Rust Book §9 (Error Handling)

/// JSON tensor dumps implementing RpnInputSource
pub mod dump;
