//! The three pass packing algorithm.
//!
//! Pass one walks the ordered candidate rectangles and places each in the
//! first node that can take it, splitting nodes down to size and
//! consolidating the free leaves left behind. Pass two retries unplaced
//! candidates with progressively reduced sizes, resetting only the regions
//! that can still help. Pass three rebuilds fragmented regions large-first
//! to claw back white space, keeping the rebuild only when it is at least as
//! good as what it replaces.
use crate::{
    core::{
        component::Component,
        constraint::{
            Anchors, ConstraintResolver, MediaFlags, ResolvedConstraint, SizeSpec, FREE_DIM,
        },
        context::{Context, Device, Group, Region},
        ComponentId, DeviceId, RegionId,
    },
    packer::{
        sort::{cmp_order, ordered, trim_unfittable, Candidate},
        split::{anchored_position, anchors_conflict, pair_split, requested_size, Axis},
    },
    pure::{
        bsp::{NodeTree, RegionKey},
        geometry::{Rect, EPS},
        layout::NotPlacedStatus,
    },
    Error, Result,
};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

pub(crate) mod sort;
pub(crate) mod split;

/// One rectangle placed by the packer.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// The placed component
    pub component_id: ComponentId,
    /// The device it landed on
    pub device_id: DeviceId,
    /// The region it landed in
    pub region_id: RegionId,
    /// The placed rectangle, region relative, margin already subtracted
    pub rect: Rect,
    /// The priority the placement was made with
    pub priority: i32,
}

/// The result of packing one group.
#[derive(Debug, Clone)]
pub struct PackOutcome {
    /// Everything that found a home, in packing order
    pub placements: Vec<Placement>,
    /// Everything that did not, with the reason
    pub failures: Vec<(ComponentId, NotPlacedStatus)>,
}

#[derive(Debug, Clone)]
struct GroupDevice<'a> {
    ix: usize,
    device: &'a Device,
    regions: Vec<Region>,
    communal: bool,
    dpi: f64,
}

#[derive(Debug, Clone, Copy)]
struct PlacedInfo {
    key: RegionKey,
    node_id: u64,
    rect: Rect,
    flags: MediaFlags,
}

#[derive(Debug, Clone)]
struct FitState {
    tree: NodeTree,
    placed: Vec<Option<PlacedInfo>>,
}

impl FitState {
    fn placed_count(&self) -> usize {
        self.placed.iter().flatten().count()
    }

    fn media_used(&self, device: usize, flag: MediaFlags) -> u32 {
        self.placed
            .iter()
            .flatten()
            .filter(|p| p.key.device == device && p.flags.contains(flag))
            .count() as u32
    }
}

/// Packs the candidate rectangles of one device group.
#[derive(Debug)]
pub struct GroupPacker<'a> {
    ctx: &'a Context,
    group: &'a Group,
    devices: Vec<GroupDevice<'a>>,
    candidates: Vec<Candidate>,
    demoted: Vec<(ComponentId, NotPlacedStatus)>,
}

impl<'a> GroupPacker<'a> {
    /// Build the packer for a group, resolving constraints for every
    /// component given. Components whose constraints fail validation are
    /// demoted to `incompatible` here and reported with the pack outcome;
    /// a missing default record is the caller's error and propagates.
    pub fn new<'c>(
        ctx: &'a Context,
        group: &'a Group,
        components: impl Iterator<Item = &'c Component>,
        resolver: &ConstraintResolver<'_>,
    ) -> Result<Self> {
        let devices: Vec<GroupDevice<'a>> = group
            .devices
            .iter()
            .map(|&ix| {
                let device = &ctx.devices[ix];
                GroupDevice {
                    ix,
                    device,
                    regions: device.layout_regions(),
                    communal: device.caps.communal_device,
                    dpi: device.caps.dpi,
                }
            })
            .collect();

        let mut candidates = Vec::new();
        let mut demoted = Vec::new();

        for (insertion, component) in components.enumerate() {
            match resolver.resolve(component, &group.id, group.kind) {
                Ok(resolved) => {
                    candidates.push(Self::candidate(
                        insertion, component, resolved, &devices,
                    ));
                }
                Err(e @ Error::MissingDefaultConstraint(_)) => return Err(e),
                Err(e) => {
                    warn!(component = %component.id, group = %group.id, error = %e, "invalid constraint, demoting");
                    demoted.push((component.id.clone(), NotPlacedStatus::Incompatible));
                }
            }
        }

        Ok(Self {
            ctx,
            group,
            devices,
            candidates,
            demoted,
        })
    }

    fn candidate(
        insertion: usize,
        component: &Component,
        resolved: ResolvedConstraint,
        devices: &[GroupDevice<'a>],
    ) -> Candidate {
        let mut valid = Vec::new();
        let mut min_area = f64::INFINITY;
        let mut min_fits_somewhere = false;
        let mut largest: Option<(f64, &GroupDevice<'a>, &Region)> = None;

        for gd in devices {
            let Some(con) = resolved.for_device(gd.communal) else {
                continue;
            };

            let caps = &gd.device.caps;
            if con.flags.contains(MediaFlags::AUDIO) && caps.concurrent_audio == 0 {
                continue;
            }
            if con.flags.contains(MediaFlags::VIDEO) && caps.concurrent_video == 0 {
                continue;
            }
            if con.flags.contains(MediaFlags::TOUCH) && !caps.touch_interaction {
                continue;
            }

            for (ri, region) in gd.regions.iter().enumerate() {
                if !con.accepts_region(&region.id) {
                    continue;
                }

                valid.push(RegionKey {
                    device: gd.ix,
                    region: ri,
                });

                let bounding = (region.width, region.height);
                let margin = con.margin_px(gd.dpi);
                let (min_w, min_h) = con.min_px(gd.dpi, bounding);
                min_area = min_area.min(min_w * min_h);
                if min_w + 2.0 * margin <= bounding.0 + EPS
                    && min_h + 2.0 * margin <= bounding.1 + EPS
                {
                    min_fits_somewhere = true;
                }

                let area = region.width * region.height;
                if largest.map(|(a, ..)| area > a).unwrap_or(true) {
                    largest = Some((area, gd, region));
                }
            }
        }

        let pref_area = largest
            .and_then(|(_, gd, region)| {
                let con = resolved.for_device(gd.communal)?;
                let bounding = (region.width, region.height);
                let (pw, ph) = con.pref_px(gd.dpi, bounding);
                let w = if SizeSpec::is_free(pw) { bounding.0 } else { pw };
                let h = if SizeSpec::is_free(ph) { bounding.1 } else { ph };

                Some(w * h)
            })
            .unwrap_or(0.0);

        let sort_priority = devices
            .iter()
            .filter_map(|gd| {
                let side = resolved.for_device(gd.communal)?;
                Some(
                    component
                        .overrides
                        .device_override(&gd.device.id)
                        .unwrap_or(side.priority),
                )
            })
            .max()
            .unwrap_or(0);

        let anchors = [resolved.communal.as_ref(), resolved.personal.as_ref()]
            .into_iter()
            .flatten()
            .fold(Anchors::empty(), |acc, c| acc | c.anchors);

        Candidate {
            insertion,
            id: component.id.clone(),
            resolved,
            overrides: component.overrides.clone(),
            anchors,
            sort_priority,
            pref_area,
            min_area: if min_area.is_finite() { min_area } else { 0.0 },
            valid,
            min_fits_somewhere,
        }
    }

    fn group_device(&self, ix: usize) -> &GroupDevice<'a> {
        self.devices
            .iter()
            .find(|gd| gd.ix == ix)
            .expect("region keys only reference group devices")
    }

    fn bounding_of(&self, key: RegionKey) -> Rect {
        let gd = self.group_device(key.device);
        Device::region_bounds(&gd.regions[key.region])
    }

    fn region_trees(&self) -> NodeTree {
        let mut tree = NodeTree::new();
        for gd in &self.devices {
            for ri in 0..gd.regions.len() {
                let key = RegionKey {
                    device: gd.ix,
                    region: ri,
                };
                tree.push_root(key, self.bounding_of(key));
            }
        }

        tree
    }

    fn priority_on(&self, cand: &Candidate, gd: &GroupDevice<'a>) -> i32 {
        let Some(side) = cand.constraint_for(gd.communal) else {
            return 0;
        };

        cand.overrides
            .device_override(&gd.device.id)
            .unwrap_or(side.priority)
    }

    /// Index of the component a candidate's device dependency points at.
    fn device_dependency<'b>(&self, cand: &'b Candidate) -> Option<&'b ComponentId> {
        [
            cand.resolved.communal.as_ref(),
            cand.resolved.personal.as_ref(),
        ]
        .into_iter()
        .flatten()
        .flat_map(|c| c.device_dependencies.iter())
        .next()
    }

    fn candidate_by_component(&self, id: &ComponentId) -> Option<usize> {
        self.candidates.iter().position(|c| &c.id == id)
    }

    fn deps_satisfied(&self, cand: &Candidate, state: &FitState) -> bool {
        cand.resolved.dependencies().all(|dep| {
            self.candidate_by_component(dep)
                .map(|ci| state.placed[ci].is_some())
                .unwrap_or(false)
        })
    }

    /// The device the candidate is pinned to by a device dependency:
    /// `Some(Err(()))` when the target is not placed at all.
    #[allow(clippy::result_unit_err)]
    fn pinned_device(&self, cand: &Candidate, state: &FitState) -> Option<std::result::Result<usize, ()>> {
        let target = self.device_dependency(cand)?;

        Some(
            self.candidate_by_component(target)
                .and_then(|ci| state.placed[ci])
                .map(|p| p.key.device)
                .ok_or(()),
        )
    }

    fn try_place(&self, state: &mut FitState, ci: usize, scale: f64) -> bool {
        let cand = &self.candidates[ci];

        if !self.deps_satisfied(cand, state) {
            return false;
        }
        let pinned = match self.pinned_device(cand, state) {
            Some(Ok(device)) => Some(device),
            Some(Err(())) => return false,
            None => None,
        };

        // first pass over free nodes
        let free: Vec<usize> = state
            .tree
            .live()
            .filter(|(_, n)| n.is_free())
            .map(|(ix, _)| ix)
            .collect();
        for ix in free {
            if self.try_place_in_node(state, ci, ix, scale, pinned) {
                return true;
            }
        }

        // fall back to splitting an occupied node whose occupant does not
        // care about one of its dimensions
        let occupied: Vec<usize> = state
            .tree
            .live()
            .filter(|(_, n)| n.occupant.is_some())
            .map(|(ix, _)| ix)
            .collect();
        for ix in occupied {
            if self.try_shared_split(state, ci, ix, scale, pinned) {
                return true;
            }
        }

        false
    }

    fn node_admits(
        &self,
        state: &FitState,
        cand: &Candidate,
        key: RegionKey,
        pinned: Option<usize>,
    ) -> Option<(f64, Rect)> {
        if !cand.valid.contains(&key) {
            return None;
        }
        if let Some(device) = pinned {
            if key.device != device {
                return None;
            }
        }

        let gd = self.group_device(key.device);
        let con = cand.constraint_for(gd.communal)?;
        if self.priority_on(cand, gd) <= 0 {
            return None;
        }

        let caps = &gd.device.caps;
        if con.flags.contains(MediaFlags::AUDIO)
            && state.media_used(key.device, MediaFlags::AUDIO) >= caps.concurrent_audio
        {
            return None;
        }
        if con.flags.contains(MediaFlags::VIDEO)
            && state.media_used(key.device, MediaFlags::VIDEO) >= caps.concurrent_video
        {
            return None;
        }

        Some((gd.dpi, self.bounding_of(key)))
    }

    fn try_place_in_node(
        &self,
        state: &mut FitState,
        ci: usize,
        ix: usize,
        scale: f64,
        pinned: Option<usize>,
    ) -> bool {
        let cand = &self.candidates[ci];
        let node = state.tree.node(ix).clone();
        let Some((dpi, bounding)) = self.node_admits(state, cand, node.key, pinned) else {
            return false;
        };
        let gd = self.group_device(node.key.device);
        let con = cand
            .constraint_for(gd.communal)
            .expect("node_admits checked the side");

        let margin = con.margin_px(dpi);
        let avail = (
            node.rect.w - 2.0 * margin,
            node.rect.h - 2.0 * margin,
        );
        let Some((w, h)) = requested_size(con, dpi, (bounding.w, bounding.h), avail, scale) else {
            return false;
        };
        let Some(alloc) = anchored_position(
            con.anchors,
            &node.rect,
            &bounding,
            w + 2.0 * margin,
            h + 2.0 * margin,
        ) else {
            return false;
        };
        let placed_rect = if margin > 0.0 {
            match alloc.inset_by(margin) {
                Some(r) => r,
                None => return false,
            }
        } else {
            alloc
        };

        let mut txn = state.tree.begin();
        match state.tree.carve(&mut txn, ix, alloc, placed_rect, ci) {
            Some(nix) => {
                let node_id = state.tree.node(nix).id;
                state.tree.commit(txn);
                state.tree.consolidate(node.key);
                state.placed[ci] = Some(PlacedInfo {
                    key: node.key,
                    node_id,
                    rect: placed_rect,
                    flags: con.flags,
                });
                trace!(component = %cand.id, device = %gd.device.id, ?placed_rect, "placed");

                true
            }
            None => {
                state.tree.rollback(txn);

                false
            }
        }
    }

    /// Split an occupied node between its occupant and the incoming
    /// candidate along an axis the occupant does not care about.
    fn try_shared_split(
        &self,
        state: &mut FitState,
        ci: usize,
        ix: usize,
        scale: f64,
        pinned: Option<usize>,
    ) -> bool {
        let cand = &self.candidates[ci];
        let node = state.tree.node(ix).clone();
        let Some(occ_ci) = node.occupant else {
            return false;
        };
        let Some((dpi, bounding)) = self.node_admits(state, cand, node.key, pinned) else {
            return false;
        };

        let gd = self.group_device(node.key.device);
        let con = cand
            .constraint_for(gd.communal)
            .expect("node_admits checked the side");
        let occ = &self.candidates[occ_ci];
        let Some(occ_con) = occ.constraint_for(gd.communal) else {
            return false;
        };

        let b = (bounding.w, bounding.h);
        let (occ_pw, occ_ph) = occ_con.pref_px(dpi, b);
        let (occ_mw, occ_mh) = occ_con.min_px(dpi, b);
        let occ_margin = occ_con.margin_px(dpi);
        let margin = con.margin_px(dpi);
        let (pw, ph) = con.pref_px(dpi, b);
        let (mw, mh) = con.min_px(dpi, b);

        for axis in [Axis::Y, Axis::X] {
            // the occupant must not care about the dimension we shrink
            let occ_free = match axis {
                Axis::Y => SizeSpec::is_free(occ_ph),
                Axis::X => SizeSpec::is_free(occ_pw),
            };
            if !occ_free || anchors_conflict(axis, occ_con.anchors, con.anchors) {
                continue;
            }

            let extent = match axis {
                Axis::Y => node.rect.h,
                Axis::X => node.rect.w,
            };
            let (a_min, b_pref, b_min) = match axis {
                Axis::Y => (
                    occ_mh + 2.0 * occ_margin,
                    if SizeSpec::is_free(ph) { ph } else { ph * scale + 2.0 * margin },
                    mh + 2.0 * margin,
                ),
                Axis::X => (
                    occ_mw + 2.0 * occ_margin,
                    if SizeSpec::is_free(pw) { pw } else { pw * scale + 2.0 * margin },
                    mw + 2.0 * margin,
                ),
            };

            let Some((a_ext, b_ext)) = pair_split(
                extent,
                (FREE_DIM, a_min, occ_con.priority),
                (b_pref, b_min, con.priority),
            ) else {
                continue;
            };

            // who keeps the near (top / left) side of the node
            let (occ_far, occ_near, inc_near) = match axis {
                Axis::Y => (
                    occ_con.anchors.contains(Anchors::BOTTOM),
                    occ_con.anchors.contains(Anchors::TOP),
                    con.anchors.contains(Anchors::TOP),
                ),
                Axis::X => (
                    occ_con.anchors.contains(Anchors::RIGHT),
                    occ_con.anchors.contains(Anchors::LEFT),
                    con.anchors.contains(Anchors::LEFT),
                ),
            };
            let occupant_near = if occ_far {
                false
            } else if occ_near {
                true
            } else {
                !inc_near
            };

            let (occ_slice, inc_slice) = match (axis, occupant_near) {
                (Axis::Y, true) => node
                    .rect
                    .split_at_height(a_ext)
                    .map(|(a, b)| (a, b)),
                (Axis::Y, false) => node
                    .rect
                    .split_at_height(b_ext)
                    .map(|(b, a)| (a, b)),
                (Axis::X, true) => node.rect.split_at_width(a_ext).map(|(a, b)| (a, b)),
                (Axis::X, false) => node.rect.split_at_width(b_ext).map(|(b, a)| (a, b)),
            }
            .unwrap_or((node.rect, node.rect));
            if occ_slice == inc_slice {
                continue;
            }

            // rebuild the occupant inside its shrunk slice
            let occ_avail = (
                occ_slice.w - 2.0 * occ_margin,
                occ_slice.h - 2.0 * occ_margin,
            );
            let Some((ow, oh)) = requested_size(occ_con, dpi, b, occ_avail, scale) else {
                continue;
            };
            let Some(occ_alloc) = anchored_position(
                occ_con.anchors,
                &occ_slice,
                &bounding,
                ow + 2.0 * occ_margin,
                oh + 2.0 * occ_margin,
            ) else {
                continue;
            };
            let occ_placed = match occ_margin > 0.0 {
                true => match occ_alloc.inset_by(occ_margin) {
                    Some(r) => r,
                    None => continue,
                },
                false => occ_alloc,
            };

            let mut txn = state.tree.begin();
            state.tree.kill(&mut txn, ix);
            let occ_node = state.tree.add(&mut txn, node.key, node.bounding, occ_slice);
            state.tree.occupy(occ_node, occ_ci, occ_placed);
            let inc_node = state.tree.add(&mut txn, node.key, node.bounding, inc_slice);

            // place the incoming candidate inside the freed slice
            let inc_avail = (inc_slice.w - 2.0 * margin, inc_slice.h - 2.0 * margin);
            let placed = requested_size(con, dpi, b, inc_avail, scale)
                .and_then(|(w, h)| {
                    anchored_position(
                        con.anchors,
                        &inc_slice,
                        &bounding,
                        w + 2.0 * margin,
                        h + 2.0 * margin,
                    )
                })
                .and_then(|alloc| {
                    let placed_rect = if margin > 0.0 {
                        alloc.inset_by(margin)?
                    } else {
                        alloc
                    };
                    state
                        .tree
                        .carve(&mut txn, inc_node, alloc, placed_rect, ci)
                        .map(|nix| (nix, placed_rect))
                });

            match placed {
                Some((nix, placed_rect)) => {
                    let occ_id = state.tree.node(occ_node).id;
                    let node_id = state.tree.node(nix).id;
                    state.tree.commit(txn);
                    state.tree.consolidate(node.key);
                    state.placed[occ_ci] = Some(PlacedInfo {
                        key: node.key,
                        node_id: occ_id,
                        rect: occ_placed,
                        flags: occ_con.flags,
                    });
                    state.placed[ci] = Some(PlacedInfo {
                        key: node.key,
                        node_id,
                        rect: placed_rect,
                        flags: con.flags,
                    });
                    trace!(component = %cand.id, shared_with = %occ.id, ?axis, "placed via shared split");

                    return true;
                }
                None => state.tree.rollback(txn),
            }
        }

        false
    }

    fn fit(&self, state: &mut FitState, order: &[usize], scale: f64) {
        for &ci in order {
            if state.placed[ci].is_some() {
                continue;
            }
            self.try_place(state, ci, scale);
        }
    }

    fn whitespace(&self, state: &FitState) -> f64 {
        state
            .tree
            .region_keys()
            .into_iter()
            .map(|k| state.tree.free_area(k))
            .sum()
    }

    /// Run all three passes.
    pub fn pack(&self) -> PackOutcome {
        self.run(true)
    }

    /// Run only the initial fit, as used by simulation dry runs.
    pub fn pack_initial(&self) -> PackOutcome {
        self.run(false)
    }

    fn run(&self, full: bool) -> PackOutcome {
        let mut order = ordered(&self.candidates);
        // candidates with nowhere to go never enter the packing order, and
        // must not count towards the usable-area estimate either
        order.retain(|&ci| {
            let c = &self.candidates[ci];
            !c.valid.is_empty() && c.min_fits_somewhere
        });

        let usable: f64 = self
            .devices
            .iter()
            .flat_map(|gd| gd.regions.iter())
            .map(|r| r.width * r.height)
            .sum();
        let trimmed = trim_unfittable(&mut order, &self.candidates, usable);

        let mut state = FitState {
            tree: self.region_trees(),
            placed: vec![None; self.candidates.len()],
        };
        self.fit(&mut state, &order, 1.0);

        if full {
            state = self.reduce_and_retry(state, &order);
            state = self.beautify(state, &order);
        }

        self.outcome(state, &order, &trimmed)
    }

    /// Pass two: reset the regions that can still help and retry everything
    /// evicted or unplaced at a reduced size, keeping the best attempt.
    fn reduce_and_retry(&self, initial: FitState, order: &[usize]) -> FitState {
        let unplaced = |s: &FitState| order.iter().any(|&ci| s.placed[ci].is_none());
        if !unplaced(&initial) {
            return initial;
        }

        let factor = self.ctx.config.reduce_factor.clamp(0.05, 1.0);
        let tries = if factor >= 1.0 - EPS {
            // a factor of 1 cannot shrink anything: a single retry only
            // benefits from the region resets
            1
        } else {
            self.ctx.config.reduce_tries
        };

        let mut best = initial.clone();
        let mut best_score = (best.placed_count(), -self.whitespace(&best));
        let mut current = initial;

        for attempt in 1..=tries {
            let scale = factor.powi(attempt as i32);

            let missing: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&ci| current.placed[ci].is_none())
                .collect();
            if missing.is_empty() {
                break;
            }

            let reset_keys: Vec<RegionKey> = current
                .tree
                .region_keys()
                .into_iter()
                .filter(|&key| {
                    current.tree.free_area(key) > EPS
                        && missing
                            .iter()
                            .any(|&ci| self.candidates[ci].valid.contains(&key))
                })
                .collect();
            if reset_keys.is_empty() {
                break;
            }

            debug!(attempt, scale, regions = reset_keys.len(), "reduction retry");

            let mut next = current.clone();
            for &key in &reset_keys {
                for slot in next.placed.iter_mut() {
                    if matches!(slot, Some(p) if p.key == key) {
                        *slot = None;
                    }
                }
                next.tree.reset_region(key, self.bounding_of(key));
            }

            self.fit(&mut next, order, scale);

            let score = (next.placed_count(), -self.whitespace(&next));
            if score > best_score {
                best = next.clone();
                best_score = score;
            }
            if !unplaced(&next) {
                break;
            }
            current = next;
        }

        best
    }

    /// Pass three: rebuild fragmented regions large-first, then re-place in
    /// top-left order when the leaves come out unsorted. Each rebuild is
    /// kept only when it places at least as many rectangles and covers at
    /// least as much area.
    fn beautify(&self, mut state: FitState, order: &[usize]) -> FitState {
        for key in state.tree.region_keys() {
            if state.tree.free_area(key) <= EPS {
                continue;
            }

            let mut in_key: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&ci| matches!(state.placed[ci], Some(p) if p.key == key))
                .collect();
            if in_key.is_empty() {
                continue;
            }

            in_key.sort_by(|&a, &b| {
                let ra = state.placed[a].map(|p| p.rect.area()).unwrap_or(0.0);
                let rb = state.placed[b].map(|p| p.rect.area()).unwrap_or(0.0);
                rb.total_cmp(&ra).then(cmp_order(
                    &self.candidates[a],
                    &self.candidates[b],
                ))
            });

            if let Some(next) = self.rebuild_region(&state, key, &in_key) {
                debug!(?key, "beautify accepted rebuild");
                state = next;
            }

            // optional top-left ordering sub-pass
            if !self.leaves_sorted(&state, key) {
                let mut by_position: Vec<usize> = in_key
                    .iter()
                    .copied()
                    .filter(|&ci| matches!(state.placed[ci], Some(p) if p.key == key))
                    .collect();
                by_position.sort_by(|&a, &b| {
                    let ra = state.placed[a].map(|p| p.rect).unwrap_or_default();
                    let rb = state.placed[b].map(|p| p.rect).unwrap_or_default();
                    ra.y.total_cmp(&rb.y).then(ra.x.total_cmp(&rb.x))
                });

                if let Some(next) = self.rebuild_region(&state, key, &by_position) {
                    state = next;
                }
            }
        }

        state
    }

    /// Re-place the given candidates into a cleared region at their current
    /// sizes, without shared splits. Returns the new state only when it is
    /// at least as full as the old one.
    fn rebuild_region(&self, state: &FitState, key: RegionKey, cands: &[usize]) -> Option<FitState> {
        let before_count = cands
            .iter()
            .filter(|&&ci| matches!(state.placed[ci], Some(p) if p.key == key))
            .count();
        let before_free = state.tree.free_area(key);

        let mut trial = state.clone();
        let sizes: HashMap<usize, Rect> = cands
            .iter()
            .filter_map(|&ci| trial.placed[ci].map(|p| (ci, p.rect)))
            .collect();
        for &ci in cands {
            if matches!(trial.placed[ci], Some(p) if p.key == key) {
                trial.placed[ci] = None;
            }
        }
        trial.tree.reset_region(key, self.bounding_of(key));

        for &ci in cands {
            let Some(prev) = sizes.get(&ci) else { continue };
            self.place_fixed(&mut trial, ci, key, (prev.w, prev.h));
        }

        let after_count = cands
            .iter()
            .filter(|&&ci| matches!(trial.placed[ci], Some(p) if p.key == key))
            .count();
        let after_free = trial.tree.free_area(key);

        (after_count >= before_count && after_free <= before_free + EPS).then_some(trial)
    }

    /// Place one candidate at a fixed size into one region's free leaves.
    fn place_fixed(&self, state: &mut FitState, ci: usize, key: RegionKey, size: (f64, f64)) -> bool {
        let cand = &self.candidates[ci];
        let gd = self.group_device(key.device);
        let Some(con) = cand.constraint_for(gd.communal) else {
            return false;
        };
        let bounding = self.bounding_of(key);
        let margin = con.margin_px(gd.dpi);

        let free: Vec<usize> = state
            .tree
            .in_region(key)
            .filter(|(_, n)| n.is_free())
            .map(|(ix, _)| ix)
            .collect();
        for ix in free {
            let node = state.tree.node(ix).clone();
            let Some(alloc) = anchored_position(
                con.anchors,
                &node.rect,
                &bounding,
                size.0 + 2.0 * margin,
                size.1 + 2.0 * margin,
            ) else {
                continue;
            };
            let placed_rect = if margin > 0.0 {
                match alloc.inset_by(margin) {
                    Some(r) => r,
                    None => continue,
                }
            } else {
                alloc
            };

            let mut txn = state.tree.begin();
            match state.tree.carve(&mut txn, ix, alloc, placed_rect, ci) {
                Some(nix) => {
                    let node_id = state.tree.node(nix).id;
                    state.tree.commit(txn);
                    state.tree.consolidate(key);
                    state.placed[ci] = Some(PlacedInfo {
                        key,
                        node_id,
                        rect: placed_rect,
                        flags: con.flags,
                    });

                    return true;
                }
                None => state.tree.rollback(txn),
            }
        }

        false
    }

    /// Whether a region's occupied leaves appear in reading order.
    fn leaves_sorted(&self, state: &FitState, key: RegionKey) -> bool {
        let rects: Vec<Rect> = state
            .tree
            .in_region(key)
            .filter_map(|(_, n)| n.placed)
            .collect();

        rects.windows(2).all(|w| {
            w[0].y + EPS < w[1].y
                || ((w[0].y - w[1].y).abs() <= EPS && w[0].x <= w[1].x + EPS)
        })
    }

    fn outcome(&self, state: FitState, order: &[usize], trimmed: &[usize]) -> PackOutcome {
        let mut placements = Vec::new();
        for &ci in order {
            let Some(p) = state.placed[ci] else { continue };
            let cand = &self.candidates[ci];
            let gd = self.group_device(p.key.device);

            placements.push(Placement {
                component_id: cand.id.clone(),
                device_id: gd.device.id.clone(),
                region_id: gd.regions[p.key.region].id.clone(),
                rect: p.rect,
                priority: self.priority_on(cand, gd),
            });
        }

        let mut failures = self.demoted.clone();
        for (ci, cand) in self.candidates.iter().enumerate() {
            if state.placed[ci].is_some() {
                continue;
            }

            let status = if cand.sort_priority <= 0 {
                NotPlacedStatus::Skipped
            } else if cand.valid.is_empty() {
                NotPlacedStatus::NoDevice
            } else if cand.has_dependencies() {
                // a dependant that could not go in next to its target failed
                // because of the dependency, whatever the proximate cause
                NotPlacedStatus::NoDependent
            } else if trimmed.contains(&ci) || !cand.min_fits_somewhere {
                NotPlacedStatus::Incompatible
            } else {
                NotPlacedStatus::Skipped
            };

            failures.push((cand.id.clone(), status));
        }

        debug!(
            group = %self.group.id,
            placed = placements.len(),
            failed = failures.len(),
            "pack finished"
        );

        PackOutcome {
            placements,
            failures,
        }
    }
}
