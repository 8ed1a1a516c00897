// ============================================================
// Layer 5: ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
// The RPN layers (Layer 4) only ever see host ndarray arrays;
// the conversion happens in model.rs.
//
// What's in this layer:
//
//   backbone.rs  - VGG16 / Inception feature extractors
//                  (both stride 16, 512 channels)
//
//   bilstm.rs    - Row-wise bidirectional LSTM that gives each
//                  cell horizontal context along its text line
//
//   loss.rs      - Cross-entropy + smooth-L1 over the anchor
//                  targets of one image
//
//   model.rs     - The CTPN network and the `Ctpn` wrapper
//                  exposing inference() and build_loss()
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Tian et al. (2016) CTPN

/// Convolutional feature extractors
pub mod backbone;

/// Row-wise BiLSTM sequence layer
pub mod bilstm;

/// Classification + regression loss assembly
pub mod loss;

/// Full network and its inference / loss entry points
pub mod model;
