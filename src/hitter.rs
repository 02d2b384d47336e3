//! Weighted minimal-hitting-set search over integer elements.
//!
//! The engine enumerates, in non-decreasing weight order, sets that hit every
//! registered conflict. Elements are positive integers. A conflict is plain
//! ("at least one of these elements must be chosen") unless it contains
//! negative entries, in which case it is signed: the negated elements are a
//! premise, and only when all of them are already chosen must one of the
//! positive elements be added.

use std::{
    cmp::Ordering,
    collections::{BTreeSet, BinaryHeap, HashSet},
};

use log::{debug, trace};

pub type Element = i64;

/// A growing candidate in the search tree. Nodes live in an arena and are
/// referenced by index; `bc`/`cc` are cursors over the already-verified plain
/// and signed conflicts.
#[derive(Clone, Debug)]
struct Node {
    set: BTreeSet<Element>,
    weight: f64,
    /// Elements that must not be added on this branch, so that each full
    /// candidate is produced at most once across the tree.
    forbidden: HashSet<Element>,
    bc: usize,
    cc: usize,
}

/// Priority snapshot taken when a node is (re-)enqueued. Greater = better:
/// lower weight, then higher plain cursor, then higher signed cursor, then
/// lower sequence id (newer nodes lose ties).
#[derive(Clone, Debug)]
struct QueueKey {
    weight: f64,
    bc: usize,
    cc: usize,
    seq: usize,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .weight
            .total_cmp(&self.weight)
            .then_with(|| self.bc.cmp(&other.bc))
            .then_with(|| self.cc.cmp(&other.cc))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueKey {}

fn hits(set: &BTreeSet<Element>, conflict: &[Element]) -> bool {
    conflict.iter().any(|e| set.contains(e))
}

pub struct Hitter {
    arena: Vec<Node>,
    queue: BinaryHeap<(QueueKey, usize)>,
    plain: Vec<Vec<Element>>,
    signed: Vec<Vec<Element>>,
    /// Positional element weights; index 0 is unused (elements are 1-based).
    weights: Vec<f64>,
}

impl Default for Hitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Hitter {
    pub fn new() -> Self {
        let root = Node {
            set: BTreeSet::new(),
            weight: 0.0,
            forbidden: HashSet::new(),
            bc: 0,
            cc: 0,
        };
        let mut hitter = Self {
            arena: vec![root],
            queue: BinaryHeap::new(),
            plain: Vec::new(),
            signed: Vec::new(),
            weights: Vec::new(),
        };
        hitter.enqueue(0);
        hitter
    }

    /// The weight of element `e`; 1 unless configured otherwise.
    pub fn weight(&self, e: Element) -> f64 {
        debug_assert!(e > 0, "elements are positive");
        self.weights.get(e as usize).copied().unwrap_or(1.0)
    }

    /// Sets positional element weights (`weights[0]` is ignored; element `e`
    /// reads `weights[e]`, defaulting to 1 past the end). Safe to call while
    /// searching only if the new list refines the old one, i.e. is longer
    /// with the same leading values; otherwise use [`Hitter::reset_weights`].
    pub fn set_weights(&mut self, weights: Vec<f64>) {
        self.weights = weights;
    }

    /// Replaces the weights and rescores every live node, rebuilding the
    /// queue from the arena.
    pub fn reset_weights(&mut self, weights: Vec<f64>) {
        self.weights = weights;
        let live: Vec<usize> = self.queue.drain().map(|(_, id)| id).collect();
        for &id in &live {
            let weight: f64 = self.arena[id].set.iter().map(|&e| self.weight(e)).sum();
            self.arena[id].weight = weight;
        }
        for id in live {
            self.enqueue(id);
        }
    }

    /// Registers a conflict. Conflicts are only checked lazily, the next time
    /// a node is popped.
    pub fn add_conflict(&mut self, conflict: Vec<Element>) {
        debug_assert!(conflict.iter().all(|&e| e != 0));
        if conflict.iter().any(|&e| e < 0) {
            trace!("signed conflict registered: {:?}", conflict);
            self.signed.push(conflict);
        } else {
            trace!("plain conflict registered: {:?}", conflict);
            self.plain.push(conflict);
        }
    }

    /// Returns the cheapest set hitting every registered conflict, or `None`
    /// if the search space is exhausted (possible only after an unhittable —
    /// empty or all-negative — conflict was registered). The returned node is
    /// re-enqueued, so repeated calls without an intervening `add_conflict`
    /// return the identical set.
    pub fn top(&mut self) -> Option<BTreeSet<Element>> {
        loop {
            let (_, id) = self.queue.pop()?;
            trace!(
                "pop node {} {:?} weight {}",
                id,
                self.arena[id].set,
                self.arena[id].weight
            );

            let mut expanded = false;
            while self.arena[id].bc < self.plain.len() {
                let ci = self.arena[id].bc;
                if hits(&self.arena[id].set, &self.plain[ci]) {
                    self.arena[id].bc += 1;
                    continue;
                }
                let conflict = self.plain[ci].clone();
                self.expand(id, &conflict);
                expanded = true;
                break;
            }
            if expanded {
                continue;
            }

            let mut expanded = false;
            while self.arena[id].cc < self.signed.len() {
                let ci = self.arena[id].cc;
                let applicable = self.signed[ci]
                    .iter()
                    .filter(|&&e| e < 0)
                    .all(|&e| self.arena[id].set.contains(&(-e)));
                if !applicable {
                    self.arena[id].cc += 1;
                    continue;
                }
                let hit = self.signed[ci]
                    .iter()
                    .any(|&e| e > 0 && self.arena[id].set.contains(&e));
                if hit {
                    self.arena[id].cc += 1;
                    continue;
                }
                let positives: Vec<Element> = self.signed[ci]
                    .iter()
                    .copied()
                    .filter(|&e| e > 0)
                    .collect();
                self.expand(id, &positives);
                expanded = true;
                break;
            }
            if expanded {
                continue;
            }

            // Both cursors exhausted: this node is an answer. Keep it queued
            // so the next call can return it again.
            let set = self.arena[id].set.clone();
            debug!("hitting set found: {:?} weight {}", set, self.arena[id].weight);
            self.enqueue(id);
            return Some(set);
        }
    }

    fn enqueue(&mut self, id: usize) {
        let node = &self.arena[id];
        let key = QueueKey {
            weight: node.weight,
            bc: node.bc,
            cc: node.cc,
            seq: id,
        };
        self.queue.push((key, id));
    }

    /// Spawns one child per non-forbidden element of `elements`, each child
    /// forbidding every element tried before it at this expansion.
    fn expand(&mut self, parent: usize, elements: &[Element]) {
        let mut forbs: Vec<Element> = Vec::new();
        for &e in elements {
            if !self.arena[parent].forbidden.contains(&e) {
                let p = &self.arena[parent];
                let mut set = p.set.clone();
                set.insert(e);
                let mut forbidden = p.forbidden.clone();
                forbidden.extend(forbs.iter().copied());
                let node = Node {
                    set,
                    weight: p.weight + self.weight(e),
                    forbidden,
                    bc: p.bc,
                    cc: 0,
                };
                self.arena.push(node);
                let id = self.arena.len() - 1;
                self.enqueue(id);
            }
            forbs.push(e);
        }
    }
}
