// ============================================================
// Layer 4: Tensor Dump Loader
// ============================================================
// Reads (and writes) one image's worth of head outputs as JSON,
// so the proposal and anchor-target layers can be run offline
// on tensors produced by any training or inference driver.
//
// File layout:
//   {
//     "im_info":   [height, width, scale],
//     "cls_prob":  { "shape": [1, H, W, A·C], "data": [...] },
//     "bbox_pred": { "shape": [1, H, W, A·4], "data": [...] },
//     "gt_boxes":  [[x1, y1, x2, y2, class], ...]        (optional)
//   }
//
// `data` is row-major (C order), matching ndarray's default.
//
// Reference: serde_json documentation
//            ndarray documentation (Array::from_shape_vec)

use anyhow::{Context, Result};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::domain::{
    boxes::{GtBox, ImageInfo},
    error::CtpnError,
    traits::{RpnInput, RpnInputSource},
};

// ─── DenseTensor ──────────────────────────────────────────────────────────────
/// A flat, row-major tensor with its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseTensor {
    pub shape: Vec<usize>,
    pub data:  Vec<f32>,
}

impl DenseTensor {
    pub fn from_array4(array: &Array4<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data:  array.iter().copied().collect(),
        }
    }

    /// Rebuild the 4-D array; `name` is only used in the error.
    pub fn into_array4(self, name: &'static str) -> Result<Array4<f32>, CtpnError> {
        let expected = self.shape.iter().product::<usize>();
        if self.shape.len() != 4 || expected != self.data.len() {
            return Err(CtpnError::shape(
                name,
                format!("4-D shape covering {} values", self.data.len()),
                &self.shape,
            ));
        }
        let dims = (self.shape[0], self.shape[1], self.shape[2], self.shape[3]);
        Array4::from_shape_vec(dims, self.data).map_err(|e| CtpnError::TensorData(e.to_string()))
    }
}

// ─── RpnDump ──────────────────────────────────────────────────────────────────
/// On-disk form of an `RpnInput`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpnDump {
    pub im_info:   [f32; 3],
    pub cls_prob:  DenseTensor,
    pub bbox_pred: DenseTensor,
    #[serde(default)]
    pub gt_boxes:  Vec<[f32; 5]>,
}

impl RpnDump {
    pub fn from_input(input: &RpnInput) -> Self {
        Self {
            im_info:   [input.im_info.height, input.im_info.width, input.im_info.scale],
            cls_prob:  DenseTensor::from_array4(&input.cls_prob),
            bbox_pred: DenseTensor::from_array4(&input.bbox_pred),
            gt_boxes:  input
                .gt_boxes
                .iter()
                .map(|g| {
                    let [x1, y1, x2, y2] = g.bbox.to_array();
                    [x1, y1, x2, y2, g.class_id as f32]
                })
                .collect(),
        }
    }

    pub fn into_input(self) -> Result<RpnInput, CtpnError> {
        Ok(RpnInput {
            cls_prob:  self.cls_prob.into_array4("rpn_cls_prob")?,
            bbox_pred: self.bbox_pred.into_array4("rpn_bbox_pred")?,
            im_info:   ImageInfo::from_triple(self.im_info),
            gt_boxes:  self.gt_boxes.into_iter().map(GtBox::from_row).collect(),
        })
    }
}

// ─── TensorDumpLoader ─────────────────────────────────────────────────────────
/// Loads a single JSON tensor dump from disk.
/// Implements the RpnInputSource trait from Layer 3.
pub struct TensorDumpLoader {
    path: PathBuf,
}

impl TensorDumpLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Write `input` to `path` in the same format `load_input` reads.
    pub fn write(path: impl Into<PathBuf>, input: &RpnInput) -> Result<()> {
        let path = path.into();
        let json = serde_json::to_string(&RpnDump::from_input(input))?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write tensor dump to '{}'", path.display()))?;

        tracing::debug!("Wrote tensor dump to '{}'", path.display());
        Ok(())
    }
}

impl RpnInputSource for TensorDumpLoader {
    fn load_input(&self) -> Result<RpnInput> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read tensor dump '{}'", self.path.display()))?;
        let dump: RpnDump = serde_json::from_str(&json)
            .with_context(|| format!("Malformed tensor dump '{}'", self.path.display()))?;

        let input = dump.into_input()?;
        tracing::debug!(
            "Loaded dump '{}': cls_prob {:?}, bbox_pred {:?}, {} gt boxes",
            self.path.display(),
            input.cls_prob.shape(),
            input.bbox_pred.shape(),
            input.gt_boxes.len()
        );
        Ok(input)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::boxes::BBox;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ctpn_dump_{}_{name}.json", std::process::id()))
    }

    #[test]
    fn test_dense_tensor_rejects_bad_shape() {
        let t = DenseTensor { shape: vec![1, 2, 2], data: vec![0.0; 4] };
        assert!(matches!(t.into_array4("rpn_cls_prob"), Err(CtpnError::ShapeMismatch { .. })));

        let t = DenseTensor { shape: vec![1, 2, 2, 2], data: vec![0.0; 7] };
        assert!(t.into_array4("rpn_cls_prob").is_err());
    }

    #[test]
    fn test_row_major_layout() {
        let t = DenseTensor { shape: vec![1, 1, 2, 2], data: vec![1.0, 2.0, 3.0, 4.0] };
        let a = t.into_array4("x").unwrap();
        assert_eq!(a[[0, 0, 1, 0]], 3.0);
    }

    #[test]
    fn test_parse_without_gt_boxes() {
        let json = r#"{
            "im_info": [32, 48, 1.0],
            "cls_prob":  { "shape": [1, 1, 1, 2], "data": [0.3, 0.7] },
            "bbox_pred": { "shape": [1, 1, 1, 4], "data": [0, 0, 0, 0] }
        }"#;
        let dump: RpnDump = serde_json::from_str(json).unwrap();
        let input = dump.into_input().unwrap();
        assert!(input.gt_boxes.is_empty());
        assert_eq!(input.im_info.width, 48.0);
        assert_eq!(input.cls_prob[[0, 0, 0, 1]], 0.7);
    }

    #[test]
    fn test_write_then_load() {
        let path = temp_path("write_then_load");
        let input = RpnInput {
            cls_prob:  Array4::from_elem((1, 2, 2, 2), 0.5),
            bbox_pred: Array4::zeros((1, 2, 2, 4)),
            im_info:   ImageInfo::new(32.0, 32.0, 1.0),
            gt_boxes:  vec![GtBox::new(BBox::new(0.0, 1.0, 15.0, 15.0), 1)],
        };

        TensorDumpLoader::write(&path, &input).unwrap();
        let loaded = TensorDumpLoader::new(&path).load_input().unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded.cls_prob, input.cls_prob);
        assert_eq!(loaded.gt_boxes, input.gt_boxes);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = TensorDumpLoader::new(temp_path("does_not_exist"));
        assert!(loader.load_input().is_err());
    }
}
