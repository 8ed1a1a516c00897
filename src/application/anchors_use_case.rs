// ============================================================
// Layer 2: AnchorsUseCase
// ============================================================
// Describes the anchor layout a configuration produces: the
// per-cell base anchors and, for a given feature map size, the
// total anchor count.
//
// Reference: Tian et al. (2016) CTPN §3.1 (fine-scale proposals)

use anyhow::Result;
use serde::Serialize;

use crate::domain::{boxes::BBox, config::CtpnConfig};
use crate::rpn::anchors::AnchorGenerator;

#[derive(Debug, Clone, Serialize)]
pub struct AnchorReport {
    pub stride:       f32,
    pub base_anchors: Vec<BBox>,
    /// [H, W] of the feature map, when one was given
    pub grid:         Option<[usize; 2]>,
    /// H·W·A, when a grid was given
    pub total:        Option<usize>,
}

pub struct AnchorsUseCase {
    generator: AnchorGenerator,
}

impl AnchorsUseCase {
    pub fn new(config: &CtpnConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { generator: AnchorGenerator::from_config(config)? })
    }

    pub fn execute(&self, grid: Option<[usize; 2]>) -> AnchorReport {
        let total = grid.map(|[h, w]| self.generator.shifted_anchors(h, w).len());
        AnchorReport {
            stride:       self.generator.stride(),
            base_anchors: self.generator.base_anchors().to_vec(),
            grid,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let report = AnchorsUseCase::new(&CtpnConfig::default()).unwrap().execute(Some([3, 5]));
        assert_eq!(report.base_anchors.len(), 10);
        assert!(report.base_anchors.iter().all(|a| a.width() == 16.0));
        assert_eq!(report.total, Some(3 * 5 * 10));
    }

    #[test]
    fn test_without_grid() {
        let report = AnchorsUseCase::new(&CtpnConfig::default()).unwrap().execute(None);
        assert!(report.total.is_none());
    }
}
