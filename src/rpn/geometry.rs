// ============================================================
// Layer 4: Box Geometry
// ============================================================
// Stateless helpers shared by the anchor target layer and the
// proposal layer:
//
//   overlaps()  IoU matrix between two box sets, O(N·M)
//   encode()    box → (dx, dy, dw, dh) relative to an anchor
//   decode()    inverse of encode()
//   clip()      clamp a box into the image
//
// Encoding (inclusive pixel coordinates):
//   dx = (gx - ax) / aw        dw = ln(gw / aw)
//   dy = (gy - ay) / ah        dh = ln(gh / ah)
// where (ax, ay) is the anchor centre and aw, ah its size.
//
// In vertical mode only dy and dh are produced / consumed.
//
// Reference: Girshick (2015) Fast R-CNN, Appendix C
//            Tian et al. (2016) CTPN §3.1 (vertical coordinates)

use ndarray::Array2;

use crate::domain::{
    boxes::{BBox, BoxDelta, ImageInfo},
    config::RegressionMode,
    error::CtpnError,
};

/// ln(1000 / 16): caps dw/dh before exp() so a wild prediction
/// cannot overflow to infinity.
pub const DELTA_LOG_CLAMP: f32 = 4.135_166_6;

/// Intersection-over-union of two boxes; 0 when they are disjoint
/// or either one is degenerate.
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let iw = a.x2.min(b.x2) - a.x1.max(b.x1) + 1.0;
    let ih = a.y2.min(b.y2) - a.y1.max(b.y1) + 1.0;
    if iw <= 0.0 || ih <= 0.0 {
        return 0.0;
    }
    let inter = iw * ih;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// IoU of every box in `boxes` against every box in `query`.
/// Result shape is `[boxes.len(), query.len()]`.
pub fn overlaps(boxes: &[BBox], query: &[BBox]) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((boxes.len(), query.len()));
    for (k, q) in query.iter().enumerate() {
        let q_area = q.area();
        if q_area == 0.0 {
            continue;
        }
        for (n, b) in boxes.iter().enumerate() {
            let iw = b.x2.min(q.x2) - b.x1.max(q.x1) + 1.0;
            if iw <= 0.0 {
                continue;
            }
            let ih = b.y2.min(q.y2) - b.y1.max(q.y1) + 1.0;
            if ih <= 0.0 {
                continue;
            }
            let inter = iw * ih;
            let union = b.area() + q_area - inter;
            if union > 0.0 {
                out[[n, k]] = inter / union;
            }
        }
    }
    out
}

/// Regression target that moves `anchor` onto `target`.
pub fn encode(anchor: &BBox, target: &BBox, mode: RegressionMode) -> Result<BoxDelta, CtpnError> {
    for b in [anchor, target] {
        if b.is_degenerate() {
            return Err(CtpnError::DegenerateBox { x1: b.x1, y1: b.y1, x2: b.x2, y2: b.y2 });
        }
    }

    let (aw, ah) = (anchor.width(), anchor.height());
    let dy = (target.center_y() - anchor.center_y()) / ah;
    let dh = (target.height() / ah).ln();

    Ok(match mode {
        RegressionMode::Vertical => BoxDelta::new(0.0, dy, 0.0, dh),
        RegressionMode::Full => BoxDelta::new(
            (target.center_x() - anchor.center_x()) / aw,
            dy,
            (target.width() / aw).ln(),
            dh,
        ),
    })
}

/// Apply `delta` to `anchor`. Exact inverse of [`encode`].
pub fn decode(anchor: &BBox, delta: &BoxDelta, mode: RegressionMode) -> BBox {
    let (aw, ah) = (anchor.width(), anchor.height());

    let cy = delta.dy * ah + anchor.center_y();
    let h = delta.dh.min(DELTA_LOG_CLAMP).exp() * ah;
    let y1 = cy - 0.5 * h;
    let y2 = cy + 0.5 * h - 1.0;

    match mode {
        RegressionMode::Vertical => BBox::new(anchor.x1, y1, anchor.x2, y2),
        RegressionMode::Full => {
            let cx = delta.dx * aw + anchor.center_x();
            let w = delta.dw.min(DELTA_LOG_CLAMP).exp() * aw;
            BBox::new(cx - 0.5 * w, y1, cx + 0.5 * w - 1.0, y2)
        }
    }
}

/// Clamp a box to `[0, width-1] × [0, height-1]`.
pub fn clip(b: &BBox, im: &ImageInfo) -> BBox {
    let max_x = (im.width - 1.0).max(0.0);
    let max_y = (im.height - 1.0).max(0.0);
    BBox::new(
        b.x1.clamp(0.0, max_x),
        b.y1.clamp(0.0, max_y),
        b.x2.clamp(0.0, max_x),
        b.y2.clamp(0.0, max_y),
    )
}

/// True when both sides are at least `min_size` pixels.
pub fn filter_min_size(b: &BBox, min_size: f32) -> bool {
    b.width() >= min_size && b.height() >= min_size
}

/// True when the box lies inside the image, allowing `border`
/// pixels of slack on every side.
pub fn is_inside(b: &BBox, im: &ImageInfo, border: f32) -> bool {
    b.x1 >= -border && b.y1 >= -border && b.x2 < im.width + border && b.y2 < im.height + border
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BBox::new(0.0, 0.0, 15.0, 15.0);
        let b = BBox::new(100.0, 100.0, 115.0, 115.0);
        assert!(close(iou(&a, &a), 1.0));
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        // 16x16 boxes shifted by 8 px: inter 8*16, union 24*16
        let a = BBox::new(0.0, 0.0, 15.0, 15.0);
        let b = BBox::new(8.0, 0.0, 23.0, 15.0);
        assert!(close(iou(&a, &b), 1.0 / 3.0));
    }

    #[test]
    fn test_overlaps_matches_pairwise_iou() {
        let boxes = [
            BBox::new(0.0, 0.0, 15.0, 15.0),
            BBox::new(4.0, 4.0, 30.0, 30.0),
            BBox::new(50.0, 50.0, 60.0, 60.0),
        ];
        let query = [BBox::new(0.0, 0.0, 20.0, 20.0), BBox::new(5.0, 5.0, 4.0, 4.0)];
        let m = overlaps(&boxes, &query);
        assert_eq!(m.dim(), (3, 2));
        for (n, b) in boxes.iter().enumerate() {
            assert!(close(m[[n, 0]], iou(b, &query[0])));
            // degenerate query never overlaps
            assert_eq!(m[[n, 1]], 0.0);
        }
    }

    #[test]
    fn test_round_trip_full() {
        let anchor = BBox::new(32.0, 40.0, 47.0, 72.0);
        let gt = BBox::new(30.5, 35.0, 50.0, 80.0);
        let d = encode(&anchor, &gt, RegressionMode::Full).unwrap();
        let back = decode(&anchor, &d, RegressionMode::Full);
        assert!(close(back.x1, gt.x1) && close(back.x2, gt.x2));
        assert!(close(back.y1, gt.y1) && close(back.y2, gt.y2));
    }

    #[test]
    fn test_round_trip_vertical_keeps_anchor_x() {
        let anchor = BBox::new(16.0, 0.0, 31.0, 15.0);
        let gt = BBox::new(16.0, 3.0, 31.0, 28.0);
        let d = encode(&anchor, &gt, RegressionMode::Vertical).unwrap();
        assert_eq!(d.dx, 0.0);
        assert_eq!(d.dw, 0.0);
        let back = decode(&anchor, &d, RegressionMode::Vertical);
        assert_eq!(back.x1, anchor.x1);
        assert_eq!(back.x2, anchor.x2);
        assert!(close(back.y1, gt.y1) && close(back.y2, gt.y2));
    }

    #[test]
    fn test_encode_rejects_degenerate() {
        let anchor = BBox::new(0.0, 0.0, 15.0, 15.0);
        let flat = BBox::new(0.0, 10.0, 15.0, 8.0);
        assert!(matches!(
            encode(&anchor, &flat, RegressionMode::Full),
            Err(CtpnError::DegenerateBox { .. })
        ));
    }

    #[test]
    fn test_decode_clamps_huge_deltas() {
        let anchor = BBox::new(0.0, 0.0, 15.0, 15.0);
        let d = BoxDelta::new(0.0, 0.0, 1e6, 1e6);
        let b = decode(&anchor, &d, RegressionMode::Full);
        assert!(b.x2.is_finite() && b.y2.is_finite());
    }

    #[test]
    fn test_filter_min_size_is_inclusive() {
        let b = BBox::new(0.0, 0.0, 7.0, 15.0);
        assert!(filter_min_size(&b, 8.0));
        assert!(!filter_min_size(&b, 9.0));
    }

    #[test]
    fn test_clip_and_inside() {
        let im = ImageInfo::new(100.0, 200.0, 1.0);
        let b = clip(&BBox::new(-5.0, -1.0, 250.0, 120.0), &im);
        assert_eq!(b, BBox::new(0.0, 0.0, 199.0, 99.0));
        assert!(is_inside(&b, &im, 0.0));
        assert!(!is_inside(&BBox::new(-1.0, 0.0, 10.0, 10.0), &im, 0.0));
        assert!(is_inside(&BBox::new(-1.0, 0.0, 10.0, 10.0), &im, 2.0));
    }
}
