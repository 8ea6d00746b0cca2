//! Prioritisation and ordering of candidate rectangles
use crate::{
    core::{
        component::PriorityOverrides,
        constraint::{Anchors, EffectiveConstraint, ResolvedConstraint},
        ComponentId,
    },
    pure::{bsp::RegionKey, geometry::EPS},
};
use std::cmp::Ordering;

/// One component's placement request within a group: the resolved constraint
/// sides plus everything the ordering and the packer need to know about it.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    /// Position in the component set; the final ordering tie break
    pub insertion: usize,
    /// The component this rectangle belongs to
    pub id: ComponentId,
    /// Effective constraints (one side, or two for mixed groups)
    pub resolved: ResolvedConstraint,
    /// Priority overrides, consulted per device at placement time
    pub overrides: PriorityOverrides,
    /// Union of anchors across sides, used for ordering
    pub anchors: Anchors,
    /// Priority used for ordering: the best the candidate can claim on any
    /// device of the group
    pub sort_priority: i32,
    /// Preferred-size pixel area resolved on the largest valid region
    pub pref_area: f64,
    /// Smallest minimum-size pixel area across valid regions
    pub min_area: f64,
    /// Regions that pass the capability and targetRegions filters
    pub valid: Vec<RegionKey>,
    /// Whether the minimum size fits at least one valid region outright
    pub min_fits_somewhere: bool,
}

impl Candidate {
    /// The constraint side that applies on a device.
    pub fn constraint_for(&self, communal_device: bool) -> Option<&EffectiveConstraint> {
        self.resolved.for_device(communal_device)
    }

    /// Whether this candidate declares placement dependencies on either side.
    pub fn has_dependencies(&self) -> bool {
        self.resolved.dependencies().next().is_some()
            || [
                self.resolved.communal.as_ref(),
                self.resolved.personal.as_ref(),
            ]
            .into_iter()
            .flatten()
            .any(|c| !c.device_dependencies.is_empty())
    }
}

/// The strictly total candidate ordering.
///
/// Priority descending, then preferred pixel area descending, then anchored
/// rectangles before unanchored ones, then the top / right / left / bottom
/// anchor cascade, and finally insertion order. The insertion tie break
/// makes the comparator total so that equal-priority equal-area candidates
/// order the same way on every evaluation.
pub(crate) fn cmp_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.sort_priority
        .cmp(&a.sort_priority)
        .then(b.pref_area.total_cmp(&a.pref_area))
        .then(match (a.anchors.is_empty(), b.anchors.is_empty()) {
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            _ => Ordering::Equal,
        })
        .then(a.anchors.sort_rank().cmp(&b.anchors.sort_rank()))
        .then(a.insertion.cmp(&b.insertion))
}

/// Candidate indices in packing order. Priority 0 is filtered out here;
/// those candidates are reported as skipped by the packer.
pub(crate) fn ordered(candidates: &[Candidate]) -> Vec<usize> {
    let mut ixs: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.sort_priority > 0)
        .map(|(ix, _)| ix)
        .collect();
    ixs.sort_by(|&a, &b| cmp_order(&candidates[a], &candidates[b]));

    ixs
}

/// Trim the tail of the ordering that provably cannot fit.
///
/// Once the accumulated minimum-size area of the candidates ahead of (and
/// including) a candidate exceeds the group's usable area, that candidate
/// and everything after it cannot be placed even at minimum size. Returns
/// the trimmed candidate indices.
pub(crate) fn trim_unfittable(
    order: &mut Vec<usize>,
    candidates: &[Candidate],
    usable_area: f64,
) -> Vec<usize> {
    let mut acc = 0.0;
    for (pos, &ix) in order.iter().enumerate() {
        acc += candidates[ix].min_area;
        if acc > usable_area + EPS {
            return order.split_off(pos);
        }
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    fn candidate(insertion: usize, priority: i32, area: f64, anchors: Anchors) -> Candidate {
        Candidate {
            insertion,
            id: ComponentId::from(format!("c{insertion}")),
            resolved: ResolvedConstraint::default(),
            overrides: PriorityOverrides::default(),
            anchors,
            sort_priority: priority,
            pref_area: area,
            min_area: area / 4.0,
            valid: vec![RegionKey {
                device: 0,
                region: 0,
            }],
            min_fits_somewhere: true,
        }
    }

    #[test]
    fn priority_dominates_area() {
        let cands = vec![
            candidate(0, 5, 1_000_000.0, Anchors::empty()),
            candidate(1, 300, 100.0, Anchors::empty()),
        ];

        assert_eq!(ordered(&cands), vec![1, 0]);
    }

    #[test]
    fn area_breaks_priority_ties() {
        let cands = vec![
            candidate(0, 5, 100.0, Anchors::empty()),
            candidate(1, 5, 200.0, Anchors::empty()),
        ];

        assert_eq!(ordered(&cands), vec![1, 0]);
    }

    #[test]
    fn anchored_candidates_come_first() {
        let cands = vec![
            candidate(0, 5, 100.0, Anchors::empty()),
            candidate(1, 5, 100.0, Anchors::BOTTOM),
        ];

        assert_eq!(ordered(&cands), vec![1, 0]);
    }

    #[test_case(Anchors::TOP, Anchors::RIGHT, true; "top before right")]
    #[test_case(Anchors::RIGHT, Anchors::LEFT, true; "right before left")]
    #[test_case(Anchors::LEFT, Anchors::BOTTOM, true; "left before bottom")]
    #[test_case(Anchors::BOTTOM, Anchors::TOP, false; "bottom after top")]
    #[test]
    fn anchor_cascade(a: Anchors, b: Anchors, a_first: bool) {
        let cands = vec![candidate(0, 5, 100.0, a), candidate(1, 5, 100.0, b)];
        let expected = if a_first { vec![0, 1] } else { vec![1, 0] };

        assert_eq!(ordered(&cands), expected);
    }

    #[test]
    fn insertion_order_is_the_final_tie_break() {
        let cands = vec![
            candidate(0, 5, 100.0, Anchors::TOP),
            candidate(1, 5, 100.0, Anchors::TOP),
        ];

        assert_eq!(ordered(&cands), vec![0, 1]);
    }

    #[test]
    fn priority_zero_is_filtered_out() {
        let cands = vec![
            candidate(0, 0, 100.0, Anchors::empty()),
            candidate(1, 5, 100.0, Anchors::empty()),
        ];

        assert_eq!(ordered(&cands), vec![1]);
    }

    #[test]
    fn trim_drops_the_provably_unfittable_tail() {
        // min areas of 25 each into a usable area of 60: the third candidate
        // pushes the accumulated minimum past the estimate
        let cands: Vec<Candidate> = (0..4)
            .map(|i| candidate(i, 10 - i as i32, 100.0, Anchors::empty()))
            .collect();
        let mut order = ordered(&cands);

        let trimmed = trim_unfittable(&mut order, &cands, 60.0);

        assert_eq!(order, vec![0, 1]);
        assert_eq!(trimmed, vec![2, 3]);
    }

    #[test]
    fn trim_keeps_everything_that_might_fit() {
        let cands: Vec<Candidate> = (0..3)
            .map(|i| candidate(i, 5, 100.0, Anchors::empty()))
            .collect();
        let mut order = ordered(&cands);

        let trimmed = trim_unfittable(&mut order, &cands, 1_000.0);

        assert!(trimmed.is_empty());
        assert_eq!(order.len(), 3);
    }
}
