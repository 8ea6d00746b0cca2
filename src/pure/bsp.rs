//! A flat binary space partition over the regions of one device group.
//!
//! The packer never works with an explicit tree: every split replaces a leaf
//! with the leaves it produces, so the live nodes of one region always tile
//! its bounding box exactly. Attempted placements run inside a [Txn] so that
//! a failed aspect correction or post-condition can unwind without cloning
//! the node list.
use crate::pure::geometry::{approx_eq, Rect, EPS};

/// Identifies one host region within the group being packed: an index into
/// the context's device list plus an index into that device's region list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RegionKey {
    /// Index into [Context::devices][crate::core::context::Context::devices]
    pub device: usize,
    /// Index into the device's layout regions
    pub region: usize,
}

/// One leaf of the partition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    /// Unique within the tree, stable across consolidation
    pub id: u64,
    /// The host region
    pub key: RegionKey,
    /// The area this leaf covers, region relative
    pub rect: Rect,
    /// The host region's full bounding box; invariant across splits
    pub bounding: Rect,
    /// Index of the candidate occupying this leaf, if any
    pub occupant: Option<usize>,
    /// The occupant's rectangle after margin insetting
    pub placed: Option<Rect>,
    dead: bool,
}

impl Node {
    /// Whether this leaf is free for placement.
    pub fn is_free(&self) -> bool {
        self.occupant.is_none()
    }
}

/// An in-flight placement attempt.
///
/// Nodes are never removed while a transaction is open: kills mark them dead
/// and additions append, so rollback is a truncate plus a revive.
#[derive(Debug, Default)]
pub(crate) struct Txn {
    added_from: usize,
    killed: Vec<usize>,
}

/// The set of live leaves for one group.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeTree {
    nodes: Vec<Node>,
    next_id: u64,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root leaf covering a whole region.
    pub fn push_root(&mut self, key: RegionKey, bounding: Rect) -> usize {
        let id = self.fresh_id();
        self.nodes.push(Node {
            id,
            key,
            rect: bounding,
            bounding,
            occupant: None,
            placed: None,
            dead: false,
        });

        self.nodes.len() - 1
    }

    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn node(&self, ix: usize) -> &Node {
        &self.nodes[ix]
    }

    /// Iterate over live leaves with their indices.
    pub fn live(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.nodes.iter().enumerate().filter(|(_, n)| !n.dead)
    }

    /// Iterate over live leaves of one region.
    pub fn in_region(&self, key: RegionKey) -> impl Iterator<Item = (usize, &Node)> {
        self.live().filter(move |(_, n)| n.key == key)
    }

    /// Live occupied leaves: (candidate index, node).
    pub fn occupants(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.live()
            .filter_map(|(_, n)| n.occupant.map(|c| (c, n)))
    }

    /// Total unoccupied area within one region.
    pub fn free_area(&self, key: RegionKey) -> f64 {
        self.in_region(key)
            .filter(|(_, n)| n.is_free())
            .map(|(_, n)| n.rect.area())
            .sum()
    }

    /// The distinct region keys present in the tree.
    pub fn region_keys(&self) -> Vec<RegionKey> {
        let mut keys: Vec<RegionKey> = Vec::new();
        for (_, n) in self.live() {
            if !keys.contains(&n.key) {
                keys.push(n.key);
            }
        }

        keys
    }

    /// Open a placement transaction.
    pub fn begin(&self) -> Txn {
        Txn {
            added_from: self.nodes.len(),
            killed: Vec::new(),
        }
    }

    /// Mark a leaf dead within a transaction.
    pub fn kill(&mut self, txn: &mut Txn, ix: usize) {
        debug_assert!(!self.nodes[ix].dead);
        self.nodes[ix].dead = true;
        txn.killed.push(ix);
    }

    /// Append a fresh free leaf within a transaction.
    pub fn add(&mut self, txn: &mut Txn, key: RegionKey, bounding: Rect, rect: Rect) -> usize {
        debug_assert!(self.nodes.len() >= txn.added_from);
        let id = self.fresh_id();
        self.nodes.push(Node {
            id,
            key,
            rect,
            bounding,
            occupant: None,
            placed: None,
            dead: false,
        });

        self.nodes.len() - 1
    }

    /// Record an occupant on a leaf created in this transaction.
    pub fn occupy(&mut self, ix: usize, candidate: usize, placed: Rect) {
        let n = &mut self.nodes[ix];
        n.occupant = Some(candidate);
        n.placed = Some(placed);
    }

    /// Keep the transaction's changes.
    pub fn commit(&mut self, txn: Txn) {
        drop(txn);
    }

    /// Undo the transaction: revive killed leaves, drop added ones.
    pub fn rollback(&mut self, txn: Txn) {
        self.nodes.truncate(txn.added_from);
        for ix in txn.killed {
            // leaves both added and killed inside the txn are already gone
            if ix < self.nodes.len() {
                self.nodes[ix].dead = false;
            }
        }
    }

    /// Split a leaf around `alloc`, occupying the carved leaf.
    ///
    /// `alloc` is the full allocation (placement plus margin) and must lie
    /// inside the leaf; `placed` is the visible rectangle recorded on the
    /// new occupied leaf. The primary guillotine cut runs along the axis
    /// with the larger total leftover so the bigger free leaf stays in one
    /// piece. Returns the occupied leaf's index, or `None` when a
    /// post-condition fails (the caller must then roll the transaction
    /// back).
    pub fn carve(
        &mut self,
        txn: &mut Txn,
        ix: usize,
        alloc: Rect,
        placed: Rect,
        candidate: usize,
    ) -> Option<usize> {
        let node = self.nodes[ix].clone();
        if !node.rect.contains(&alloc) || node.occupant.is_some() {
            return None;
        }

        let added_mark = self.nodes.len();
        let leftover_w = node.rect.w - alloc.w;
        let leftover_h = node.rect.h - alloc.h;
        let vertical_first = leftover_w >= leftover_h;

        self.kill(txn, ix);

        // full length strips on the primary axis, then the secondary cuts
        // within the middle band
        let mut band = node.rect;
        if vertical_first {
            if alloc.x - band.x > EPS {
                let w = alloc.x - band.x;
                self.add(txn, node.key, node.bounding, Rect::new(band.x, band.y, w, band.h));
                band.x += w;
                band.w -= w;
            }
            if band.right() - alloc.right() > EPS {
                let w = band.right() - alloc.right();
                self.add(
                    txn,
                    node.key,
                    node.bounding,
                    Rect::new(alloc.right(), band.y, w, band.h),
                );
                band.w -= w;
            }
            if alloc.y - band.y > EPS {
                let h = alloc.y - band.y;
                self.add(txn, node.key, node.bounding, Rect::new(band.x, band.y, band.w, h));
                band.y += h;
                band.h -= h;
            }
            if band.bottom() - alloc.bottom() > EPS {
                let h = band.bottom() - alloc.bottom();
                self.add(
                    txn,
                    node.key,
                    node.bounding,
                    Rect::new(band.x, alloc.bottom(), band.w, h),
                );
                band.h -= h;
            }
        } else {
            if alloc.y - band.y > EPS {
                let h = alloc.y - band.y;
                self.add(txn, node.key, node.bounding, Rect::new(band.x, band.y, band.w, h));
                band.y += h;
                band.h -= h;
            }
            if band.bottom() - alloc.bottom() > EPS {
                let h = band.bottom() - alloc.bottom();
                self.add(
                    txn,
                    node.key,
                    node.bounding,
                    Rect::new(band.x, alloc.bottom(), band.w, h),
                );
                band.h -= h;
            }
            if alloc.x - band.x > EPS {
                let w = alloc.x - band.x;
                self.add(txn, node.key, node.bounding, Rect::new(band.x, band.y, w, band.h));
                band.x += w;
                band.w -= w;
            }
            if band.right() - alloc.right() > EPS {
                let w = band.right() - alloc.right();
                self.add(
                    txn,
                    node.key,
                    node.bounding,
                    Rect::new(alloc.right(), band.y, w, band.h),
                );
                band.w -= w;
            }
        }

        // the band that remains is the allocation itself
        let carved = self.add(txn, node.key, node.bounding, band);

        // post-conditions: the carved leaf matches the allocation and the
        // children tile the parent exactly
        let tiled: f64 = self.nodes[added_mark..]
            .iter()
            .map(|n| n.rect.area())
            .sum();
        if !approx_eq(band.area(), alloc.area()) || (tiled - node.rect.area()).abs() > 1.0 {
            return None;
        }

        self.occupy(carved, candidate, placed);

        Some(carved)
    }

    /// Merge free leaves of one region pairwise until no merge is possible.
    ///
    /// Two free leaves merge when they share the full length of one edge and
    /// have identical lengths along the orthogonal axis.
    pub fn consolidate(&mut self, key: RegionKey) {
        loop {
            let free: Vec<usize> = self
                .in_region(key)
                .filter(|(_, n)| n.is_free())
                .map(|(ix, _)| ix)
                .collect();

            let mut merged = None;
            'outer: for (i, &a) in free.iter().enumerate() {
                for &b in &free[i + 1..] {
                    if let Some(r) = self.nodes[a].rect.merged(&self.nodes[b].rect) {
                        merged = Some((a, b, r));
                        break 'outer;
                    }
                }
            }

            match merged {
                Some((a, b, r)) => {
                    let (key, bounding) = (self.nodes[a].key, self.nodes[a].bounding);
                    self.nodes[a].dead = true;
                    self.nodes[b].dead = true;
                    let id = self.fresh_id();
                    self.nodes.push(Node {
                        id,
                        key,
                        rect: r,
                        bounding,
                        occupant: None,
                        placed: None,
                        dead: false,
                    });
                }
                None => break,
            }
        }
    }

    /// Drop every leaf of a region and start it over as a single free root.
    pub fn reset_region(&mut self, key: RegionKey, bounding: Rect) {
        for n in self.nodes.iter_mut().filter(|n| n.key == key) {
            n.dead = true;
        }
        self.push_root(key, bounding);
    }
}
