// ============================================================
// Layer 3: Core Error Type
// ============================================================
// Every failure the detection core can report. Configuration
// and shape problems are fatal for the call that hit them;
// degenerate boxes are normally filtered before they get here.
//
// The outer layers (application, cli, infra) wrap these in
// anyhow::Error with extra context.
//
// Reference: Rust Book §9 (Error Handling)
//            thiserror crate documentation

use thiserror::Error;

/// Errors raised by anchor generation, assignment, decoding and
/// the network wrapper.
#[derive(Debug, Error)]
pub enum CtpnError {
    /// Invalid or inconsistent configuration value
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Backbone selector that no feature extractor is registered for
    #[error("unsupported backbone '{0}' (expected one of: vgg16, inception)")]
    UnsupportedBackbone(String),

    /// A tensor whose shape disagrees with the configured anchor layout
    #[error("shape mismatch for {tensor}: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        tensor:   &'static str,
        expected: String,
        actual:   Vec<usize>,
    },

    /// Box with non-positive width or height fed to the delta encoder
    #[error("degenerate box [{x1}, {y1}, {x2}, {y2}] has no area")]
    DegenerateBox { x1: f32, y1: f32, x2: f32, y2: f32 },

    /// Failed to pull tensor data back to the host
    #[error("tensor data conversion failed: {0}")]
    TensorData(String),
}

impl CtpnError {
    /// Shorthand for a configuration error with a formatted message
    pub fn config(msg: impl Into<String>) -> Self {
        CtpnError::Configuration(msg.into())
    }

    pub fn shape(tensor: &'static str, expected: impl Into<String>, actual: &[usize]) -> Self {
        CtpnError::ShapeMismatch {
            tensor,
            expected: expected.into(),
            actual:   actual.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_message_names_tensor() {
        let err = CtpnError::shape("cls_prob", "[1, H, W, 20]", &[1, 2, 2, 18]);
        let msg = err.to_string();
        assert!(msg.contains("cls_prob"));
        assert!(msg.contains("[1, 2, 2, 18]"));
    }
}
