//! Sizing arithmetic for node splits: requested sizes, aspect correction,
//! anchor placement and the pair-priority rule for sharing a node.
use crate::{
    core::constraint::{Anchors, EffectiveConstraint, SizeSpec},
    pure::geometry::{approx_eq, Rect, EPS},
};

/// The axis a shared-node split runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    /// Split into left / right slices
    X,
    /// Split into top / bottom slices
    Y,
}

/// The size a candidate asks for inside an available area.
///
/// Free preferred dimensions fill the available extent; finite ones are
/// scaled by the reduction factor and floored at the minimum size. The
/// result is aspect corrected and `None` when the minimum size can not be
/// honoured in `avail`.
pub(crate) fn requested_size(
    c: &EffectiveConstraint,
    dpi: f64,
    bounding: (f64, f64),
    avail: (f64, f64),
    scale: f64,
) -> Option<(f64, f64)> {
    if avail.0 < 1.0 - EPS || avail.1 < 1.0 - EPS {
        return None;
    }

    let (min_w, min_h) = c.min_px(dpi, bounding);
    let (pref_w, pref_h) = c.pref_px(dpi, bounding);

    let mut w = if SizeSpec::is_free(pref_w) {
        avail.0
    } else {
        (pref_w * scale).max(min_w)
    };
    let mut h = if SizeSpec::is_free(pref_h) {
        avail.1
    } else {
        (pref_h * scale).max(min_h)
    };
    w = w.min(avail.0);
    h = h.min(avail.1);

    if c.aspect > 0.0 {
        let w_fit = w.min(h / c.aspect);
        let h_fit = w_fit * c.aspect;
        (w, h) = (w_fit, h_fit);
    }

    if w + EPS < min_w || h + EPS < min_h {
        return None;
    }

    Some((w, h))
}

/// Whether a rectangle honours every anchor in `anchors` relative to its
/// host region's bounding box.
pub(crate) fn satisfies_anchors(anchors: Anchors, r: &Rect, bounding: &Rect) -> bool {
    // centring is honoured to within half a pixel: integer region sizes
    // cannot centre an odd remainder exactly
    let centred = |c: f64, mid: f64| (c - mid).abs() <= 0.5 + EPS;

    (!anchors.contains(Anchors::TOP) || r.y <= EPS)
        && (!anchors.contains(Anchors::BOTTOM) || approx_eq(r.bottom(), bounding.h))
        && (!anchors.contains(Anchors::LEFT) || r.x <= EPS)
        && (!anchors.contains(Anchors::RIGHT) || approx_eq(r.right(), bounding.w))
        && (!anchors.contains(Anchors::VCENTER) || centred(r.y + r.h / 2.0, bounding.h / 2.0))
        && (!anchors.contains(Anchors::HCENTER) || centred(r.x + r.w / 2.0, bounding.w / 2.0))
}

/// Position an `alloc_w` x `alloc_h` allocation inside `node` so that every
/// anchor is honoured, or `None` when the node cannot host it.
///
/// Centred placements additionally require the node's own midpoint to fall
/// within the allocation: that is what makes the resulting three-way split
/// legal (a slice above, the centred allocation, a slice below).
pub(crate) fn anchored_position(
    anchors: Anchors,
    node: &Rect,
    bounding: &Rect,
    alloc_w: f64,
    alloc_h: f64,
) -> Option<Rect> {
    let mut x = node.x;
    let mut y = node.y;

    if anchors.contains(Anchors::RIGHT) && !anchors.contains(Anchors::LEFT) {
        x = node.right() - alloc_w;
    }
    if anchors.contains(Anchors::HCENTER) {
        x = (bounding.w - alloc_w) / 2.0;
    }
    if anchors.contains(Anchors::BOTTOM) && !anchors.contains(Anchors::TOP) {
        y = node.bottom() - alloc_h;
    }
    if anchors.contains(Anchors::VCENTER) {
        y = (bounding.h - alloc_h) / 2.0;
    }

    let alloc = Rect::new(x, y, alloc_w, alloc_h);
    if !node.contains(&alloc) || !satisfies_anchors(anchors, &alloc, bounding) {
        return None;
    }

    if anchors.contains(Anchors::VCENTER) {
        let mid = node.midpoint().y;
        if mid < alloc.y - EPS || mid > alloc.bottom() + EPS {
            return None;
        }
    }
    if anchors.contains(Anchors::HCENTER) {
        let mid = node.midpoint().x;
        if mid < alloc.x - EPS || mid > alloc.right() + EPS {
            return None;
        }
    }

    Some(alloc)
}

/// Whether two rectangles sharing a node would claim the same edge of the
/// split axis, which rules the shared split out.
pub(crate) fn anchors_conflict(axis: Axis, a: Anchors, b: Anchors) -> bool {
    let shared = a & b;
    match axis {
        Axis::Y => shared.intersects(Anchors::TOP | Anchors::BOTTOM | Anchors::VCENTER),
        Axis::X => shared.intersects(Anchors::LEFT | Anchors::RIGHT | Anchors::HCENTER),
    }
}

/// Divide `extent` between an existing occupant `a` and an incoming
/// rectangle `b` along one axis.
///
/// - Both free on the axis: split midway, growing whichever declares the
///   larger minimum; the higher priority side wins exact ties.
/// - Exactly one finite preference: that side gets its preference and the
///   other the remainder, clamped up to its minimum.
/// - Both finite: the higher priority side gets its preference when the
///   remainder still covers the other's minimum, otherwise fall back to the
///   minimum based split.
///
/// Returns `(a_extent, b_extent)` or `None` when the minimums cannot both be
/// honoured.
pub(crate) fn pair_split(
    extent: f64,
    (a_pref, a_min, a_priority): (f64, f64, i32),
    (b_pref, b_min, b_priority): (f64, f64, i32),
) -> Option<(f64, f64)> {
    if a_min + b_min > extent + EPS {
        return None;
    }

    let a_free = SizeSpec::is_free(a_pref);
    let b_free = SizeSpec::is_free(b_pref);

    let min_based = || -> Option<(f64, f64)> {
        let half = extent / 2.0;
        let (a_ext, b_ext) = if a_min > b_min + EPS {
            let a_ext = a_min.max(half);
            (a_ext, extent - a_ext)
        } else if b_min > a_min + EPS {
            let b_ext = b_min.max(half);
            (extent - b_ext, b_ext)
        } else if a_priority >= b_priority {
            let a_ext = a_min.max(half);
            (a_ext, extent - a_ext)
        } else {
            let b_ext = b_min.max(half);
            (extent - b_ext, b_ext)
        };

        if a_ext + EPS < a_min || b_ext + EPS < b_min {
            None
        } else {
            Some((a_ext, b_ext))
        }
    };

    let exact = |pref: f64, own_min: f64, other_min: f64| -> Option<(f64, f64)> {
        let mut own = pref.max(own_min);
        let mut other = extent - own;
        if other < other_min {
            other = other_min;
            own = extent - other;
        }

        if own + EPS < own_min {
            None
        } else {
            Some((own, other))
        }
    };

    match (a_free, b_free) {
        (true, true) => min_based(),
        (false, true) => exact(a_pref, a_min, b_min),
        (true, false) => exact(b_pref, b_min, a_min).map(|(b, a)| (a, b)),
        (false, false) => {
            let higher_first = if a_priority >= b_priority {
                exact(a_pref, a_min, b_min)
            } else {
                exact(b_pref, b_min, a_min).map(|(b, a)| (a, b))
            };

            // the exact split abandons the preference when the remainder is
            // pinched; detect that and fall back to the minimum based rule
            match higher_first {
                Some((a_ext, b_ext)) => {
                    let kept_pref = if a_priority >= b_priority {
                        approx_eq(a_ext, a_pref.max(a_min))
                    } else {
                        approx_eq(b_ext, b_pref.max(b_min))
                    };
                    if kept_pref {
                        Some((a_ext, b_ext))
                    } else {
                        min_based()
                    }
                }
                None => min_based(),
            }
        }
    }
}
