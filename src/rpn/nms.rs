// ============================================================
// Layer 4: Non-Maximum Suppression
// ============================================================
// Greedy NMS over boxes that are already sorted by descending
// score. Walking the list front to back, a box is kept only if
// its IoU with every box kept so far is strictly below the
// threshold, so no two survivors overlap at or above it.
//
// Reference: Felzenszwalb et al. (2010) - greedy NMS

use crate::domain::boxes::BBox;
use crate::rpn::geometry::iou;

/// Return the positions (into `boxes`) of the boxes that survive.
///
/// `boxes` must be ordered by descending score; ties are settled by
/// that order, the earlier box wins.
pub fn nms(boxes: &[BBox], threshold: f32) -> Vec<usize> {
    let mut keep: Vec<usize> = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for i in 0..boxes.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        for j in (i + 1)..boxes.len() {
            if !suppressed[j] && iou(&boxes[i], &boxes[j]) >= threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(nms(&[], 0.5).is_empty());
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let b = BBox::new(0.0, 0.0, 15.0, 15.0);
        assert_eq!(nms(&[b, b, b], 0.7), vec![0]);
    }

    #[test]
    fn test_survivors_pairwise_below_threshold() {
        let boxes: Vec<BBox> = (0..20)
            .map(|i| {
                let x = (i * 5) as f32;
                BBox::new(x, 0.0, x + 15.0, 15.0)
            })
            .collect();
        let threshold = 0.3;
        let keep = nms(&boxes, threshold);
        assert!(!keep.is_empty());
        for (a, &i) in keep.iter().enumerate() {
            for &j in &keep[a + 1..] {
                assert!(iou(&boxes[i], &boxes[j]) < threshold);
            }
        }
    }

    #[test]
    fn test_suppression_is_not_transitive() {
        // 0 suppresses 1, but 2 only overlaps 1, so 2 survives
        let boxes = [
            BBox::new(0.0, 0.0, 15.0, 15.0),
            BBox::new(6.0, 0.0, 21.0, 15.0),
            BBox::new(12.0, 0.0, 27.0, 15.0),
        ];
        assert_eq!(nms(&boxes, 0.4), vec![0, 2]);
    }
}
