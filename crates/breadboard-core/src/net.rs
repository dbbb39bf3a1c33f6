//! Net builder: partitions every pin into electrically connected groups.
//!
//! A pure function of topology. Each wire unions its two endpoints; a
//! junction's single pin is an ordinary member, so wires meeting at a
//! junction merge naturally. Component props are never read.
//!
//! Pins of the same component are *not* joined: current through a part is
//! modelled by the behavior layer, not by the partition.

use std::collections::{BTreeMap, HashMap};

use crate::component::{Component, Wire};
use crate::id::{NetId, PinRef};

// ---------------------------------------------------------------------------
// Union-find
// ---------------------------------------------------------------------------

/// Disjoint-set forest with path halving and union by size.
#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    size: Vec<u32>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub(crate) fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}

// ---------------------------------------------------------------------------
// Net map
// ---------------------------------------------------------------------------

/// The result of one net build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMap {
    pin_to_net: HashMap<PinRef, NetId>,
    nets: BTreeMap<NetId, Vec<PinRef>>,
    /// Wires skipped because an endpoint did not resolve to a pin.
    dangling_wires: usize,
}

impl NetMap {
    /// The net containing `pin`, if the pin exists.
    pub fn net_of(&self, pin: &PinRef) -> Option<NetId> {
        self.pin_to_net.get(pin).copied()
    }

    /// Member pins of `net`, in component-then-pin order.
    pub fn members(&self, net: NetId) -> &[PinRef] {
        self.nets.get(&net).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All nets in id order.
    pub fn nets(&self) -> impl Iterator<Item = (NetId, &[PinRef])> {
        self.nets.iter().map(|(id, pins)| (*id, pins.as_slice()))
    }

    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    pub fn pin_count(&self) -> usize {
        self.pin_to_net.len()
    }

    pub fn dangling_wires(&self) -> usize {
        self.dangling_wires
    }

    /// Whether two pins share a net.
    pub fn connected(&self, a: &PinRef, b: &PinRef) -> bool {
        match (self.net_of(a), self.net_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// The partition as a canonical set of sorted member lists, independent
    /// of net numbering. Two builds describe the same topology iff their
    /// partitions are equal.
    pub fn partition(&self) -> Vec<Vec<PinRef>> {
        let mut groups: Vec<Vec<PinRef>> = self.nets.values().cloned().collect();
        groups.sort();
        groups
    }
}

/// Build nets for the given topology. Total over any input: wires whose
/// endpoints name missing components or pins are skipped.
pub fn build_nets(components: &[Component], wires: &[Wire]) -> NetMap {
    let mut index: HashMap<PinRef, usize> = HashMap::new();
    let mut pins: Vec<PinRef> = Vec::new();
    for c in components {
        for p in &c.pins {
            let r = PinRef::new(&c.id, &p.id);
            if !index.contains_key(&r) {
                index.insert(r.clone(), pins.len());
                pins.push(r);
            }
        }
    }

    let mut uf = UnionFind::new(pins.len());
    let mut dangling_wires = 0;
    for w in wires {
        match (index.get(&w.a), index.get(&w.b)) {
            (Some(&a), Some(&b)) => uf.union(a, b),
            _ => {
                log::debug!("skipping dangling wire {} ({} -> {})", w.id, w.a, w.b);
                dangling_wires += 1;
            }
        }
    }

    // Net ids follow the order in which each root is first seen.
    let mut root_to_net: HashMap<usize, NetId> = HashMap::new();
    let mut pin_to_net = HashMap::with_capacity(pins.len());
    let mut nets: BTreeMap<NetId, Vec<PinRef>> = BTreeMap::new();
    for (i, pin) in pins.into_iter().enumerate() {
        let root = uf.find(i);
        let next = NetId(root_to_net.len() as u32);
        let net = *root_to_net.entry(root).or_insert(next);
        nets.entry(net).or_default().push(pin.clone());
        pin_to_net.insert(pin, net);
    }
    for members in nets.values_mut() {
        members.sort();
    }

    NetMap {
        pin_to_net,
        nets,
        dangling_wires,
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Reuses the last [`NetMap`] while the structural version is unchanged.
#[derive(Debug, Clone, Default)]
pub struct NetCache {
    version: Option<u64>,
    map: NetMap,
    rebuilds: u64,
}

impl NetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return nets for `structural_version`, rebuilding only if it changed.
    pub fn get(&mut self, structural_version: u64, components: &[Component], wires: &[Wire]) -> &NetMap {
        if self.version != Some(structural_version) {
            self.map = build_nets(components, wires);
            self.version = Some(structural_version);
            self.rebuilds += 1;
            log::debug!(
                "rebuilt {} nets over {} pins (structural version {structural_version})",
                self.map.net_count(),
                self.map.pin_count()
            );
        }
        &self.map
    }

    /// The most recently built map, without checking freshness.
    pub fn current(&self) -> &NetMap {
        &self.map
    }

    /// Force a rebuild on the next [`NetCache::get`].
    pub fn invalidate(&mut self) {
        self.version = None;
    }

    /// Number of rebuilds performed so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}
