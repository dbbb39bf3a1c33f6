//! Per-tick net resolution.
//!
//! Turns the drivers asserted by components into one [`NetState`] per net:
//!
//! 1. Seed each net with its strong (digital) and analog drivers.
//! 2. Propagate strong levels across closed switches (pressed buttons)
//!    until nothing changes, so a press takes effect on the tick it happens.
//! 3. Give undriven nets a *pulled* level from strong nets reachable through
//!    resistor chains. Conflicting pulls leave the net floating.
//!
//! Nets with conflicting strong drivers keep the first driver's level here;
//! the short-circuit detector clamps them afterwards. Nets joined by closed
//! switches form one *switch group*, so a fault spanning a switch is a single
//! short.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;
use crate::id::{NetId, PinRef};
use crate::net::{NetMap, UnionFind};

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

/// A digital logic level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_bool(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

/// What a pin forces onto its net.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Drive {
    /// A strong digital level (output pin, rail, closed switch).
    Strong(Level),
    /// An analog ratio in [0, 1] (wiper, PWM duty, analog sensor output).
    Analog(Fixed64),
}

/// A pin actively driving its net.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub pin: PinRef,
    pub drive: Drive,
}

impl Driver {
    pub fn strong(pin: PinRef, level: Level) -> Self {
        Self {
            pin,
            drive: Drive::Strong(level),
        }
    }

    pub fn analog(pin: PinRef, ratio: Fixed64) -> Self {
        Self {
            pin,
            drive: Drive::Analog(ratio),
        }
    }

    pub fn strong_level(&self) -> Option<Level> {
        match self.drive {
            Drive::Strong(l) => Some(l),
            Drive::Analog(_) => None,
        }
    }
}

/// Everything resolution needs besides the nets themselves.
#[derive(Debug, Clone, Default)]
pub struct DriveSet {
    pub drivers: Vec<Driver>,
    /// Closed switches: each pair conducts strong levels in both directions.
    pub switches: Vec<(PinRef, PinRef)>,
    /// Resistors: each pair conducts pulls into undriven nets.
    pub resistors: Vec<(PinRef, PinRef)>,
}

// ---------------------------------------------------------------------------
// Resolved net state
// ---------------------------------------------------------------------------

/// The resolved value of a net for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NetLevel {
    High,
    Low,
    Analog(Fixed64),
    /// Nothing drives or pulls the net. Reads as LOW.
    Floating,
    /// Conflicting strong drivers. Set only by the short-circuit detector.
    Short,
}

/// How firmly the level is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strength {
    Strong,
    Pulled,
    Undriven,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetState {
    pub level: NetLevel,
    pub strength: Strength,
    pub drivers: Vec<Driver>,
}

impl NetState {
    fn undriven() -> Self {
        Self {
            level: NetLevel::Floating,
            strength: Strength::Undriven,
            drivers: Vec::new(),
        }
    }

    fn has_strong(&self, level: Level) -> bool {
        self.drivers.iter().any(|d| d.strong_level() == Some(level))
    }

    /// Whether strong drivers on this net disagree.
    pub fn is_contested(&self) -> bool {
        self.has_strong(Level::High) && self.has_strong(Level::Low)
    }

    pub fn is_short(&self) -> bool {
        self.level == NetLevel::Short
    }

    /// Digital read. Analog values read HIGH at or above one half.
    pub fn reads_high(&self) -> bool {
        match self.level {
            NetLevel::High => true,
            NetLevel::Analog(v) => v >= Fixed64::from_num(0.5),
            NetLevel::Low | NetLevel::Floating | NetLevel::Short => false,
        }
    }

    /// Whether the net is actively held LOW (driven or pulled), as a current
    /// sink needs. Floating does not count.
    pub fn sinks(&self) -> bool {
        self.level == NetLevel::Low
    }

    /// Analog value in [0, 1], if the net carries one. Digital levels map to
    /// 0 and 1.
    pub fn ratio(&self) -> Option<Fixed64> {
        match self.level {
            NetLevel::High => Some(Fixed64::from_num(1)),
            NetLevel::Low => Some(Fixed64::ZERO),
            NetLevel::Analog(v) => Some(v),
            NetLevel::Floating | NetLevel::Short => None,
        }
    }
}

/// Net states for one tick, indexed by [`NetId`].
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    map: &'a NetMap,
    states: Vec<NetState>,
    /// Smallest net id of each net's switch group.
    groups: Vec<NetId>,
}

impl<'a> Resolution<'a> {
    pub fn map(&self) -> &'a NetMap {
        self.map
    }

    pub fn state(&self, net: NetId) -> Option<&NetState> {
        self.states.get(net.0 as usize)
    }

    pub fn state_mut(&mut self, net: NetId) -> Option<&mut NetState> {
        self.states.get_mut(net.0 as usize)
    }

    /// State of the net containing `pin`. Unknown pins read as undriven.
    pub fn at(&self, pin: &PinRef) -> &NetState {
        static UNDRIVEN: std::sync::OnceLock<NetState> = std::sync::OnceLock::new();
        self.map
            .net_of(pin)
            .and_then(|n| self.state(n))
            .unwrap_or_else(|| UNDRIVEN.get_or_init(NetState::undriven))
    }

    /// The switch group of `net`, named by its smallest member. A net with no
    /// closed switch is its own group.
    pub fn group_of(&self, net: NetId) -> NetId {
        self.groups.get(net.0 as usize).copied().unwrap_or(net)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NetId, &NetState)> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, s)| (NetId(i as u32), s))
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve every net of `map` under `drive`.
pub fn resolve<'a>(map: &'a NetMap, drive: &DriveSet) -> Resolution<'a> {
    let mut states: Vec<NetState> = (0..map.net_count()).map(|_| NetState::undriven()).collect();
    let net_index = |pin: &PinRef| map.net_of(pin).map(|n| n.0 as usize);

    for d in &drive.drivers {
        if let Some(i) = net_index(&d.pin) {
            states[i].drivers.push(d.clone());
        }
    }

    // Closed switches: copy strong levels across until stable. Levels only
    // ever get added, so this terminates.
    let switches: Vec<(usize, usize, &PinRef, &PinRef)> = drive
        .switches
        .iter()
        .filter_map(|(a, b)| Some((net_index(a)?, net_index(b)?, a, b)))
        .filter(|(na, nb, _, _)| na != nb)
        .collect();
    let groups = switch_groups(states.len(), &switches);
    let mut changed = true;
    while changed {
        changed = false;
        for &(na, nb, pa, pb) in &switches {
            for level in [Level::High, Level::Low] {
                if states[na].has_strong(level) && !states[nb].has_strong(level) {
                    states[nb].drivers.push(Driver::strong(pb.clone(), level));
                    changed = true;
                }
                if states[nb].has_strong(level) && !states[na].has_strong(level) {
                    states[na].drivers.push(Driver::strong(pa.clone(), level));
                    changed = true;
                }
            }
        }
    }

    for s in &mut states {
        classify(s);
    }

    apply_pulls(map, &mut states, &drive.resistors);

    Resolution { map, states, groups }
}

/// Name each net's switch group by its smallest member.
fn switch_groups(n: usize, switches: &[(usize, usize, &PinRef, &PinRef)]) -> Vec<NetId> {
    let mut uf = UnionFind::new(n);
    for &(na, nb, _, _) in switches {
        uf.union(na, nb);
    }
    let mut smallest: Vec<Option<usize>> = vec![None; n];
    let roots: Vec<usize> = (0..n).map(|i| uf.find(i)).collect();
    for (i, &root) in roots.iter().enumerate() {
        smallest[root].get_or_insert(i);
    }
    roots
        .iter()
        .enumerate()
        .map(|(i, &root)| NetId(smallest[root].unwrap_or(i) as u32))
        .collect()
}

/// Set level and strength from the drivers alone.
fn classify(s: &mut NetState) {
    if let Some(level) = s.drivers.iter().find_map(Driver::strong_level) {
        s.level = match level {
            Level::High => NetLevel::High,
            Level::Low => NetLevel::Low,
        };
        s.strength = Strength::Strong;
        return;
    }
    let analog: Vec<Fixed64> = s
        .drivers
        .iter()
        .filter_map(|d| match d.drive {
            Drive::Analog(v) => Some(v),
            Drive::Strong(_) => None,
        })
        .collect();
    if !analog.is_empty() {
        let sum: Fixed64 = analog.iter().copied().sum();
        s.level = NetLevel::Analog(sum / Fixed64::from_num(analog.len() as u32));
        s.strength = Strength::Strong;
    }
}

/// Pull undriven nets toward the strong levels reachable through resistors.
fn apply_pulls(map: &NetMap, states: &mut [NetState], resistors: &[(PinRef, PinRef)]) {
    let n = states.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (a, b) in resistors {
        if let (Some(na), Some(nb)) = (map.net_of(a), map.net_of(b)) {
            let (na, nb) = (na.0 as usize, nb.0 as usize);
            if na != nb {
                adjacency[na].push(nb);
                adjacency[nb].push(na);
            }
        }
    }

    let mut visited = vec![false; n];
    for start in 0..n {
        if visited[start] || states[start].strength != Strength::Undriven || adjacency[start].is_empty() {
            continue;
        }
        // Flood the cluster of undriven nets, noting the strong levels at its edge.
        let mut cluster = Vec::new();
        let (mut sees_high, mut sees_low) = (false, false);
        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        while let Some(i) = queue.pop_front() {
            cluster.push(i);
            for &j in &adjacency[i] {
                let neighbor = &states[j];
                if neighbor.strength == Strength::Strong {
                    if !neighbor.is_contested() {
                        match neighbor.level {
                            NetLevel::High => sees_high = true,
                            NetLevel::Low => sees_low = true,
                            _ => {}
                        }
                    }
                } else if !visited[j] {
                    visited[j] = true;
                    queue.push_back(j);
                }
            }
        }
        let level = match (sees_high, sees_low) {
            (true, false) => NetLevel::High,
            (false, true) => NetLevel::Low,
            _ => continue,
        };
        for i in cluster {
            states[i].level = level;
            states[i].strength = Strength::Pulled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Position, Wire};
    use crate::library;
    use crate::net::build_nets;

    fn origin() -> Position {
        Position::default()
    }

    fn junctions(n: usize) -> Vec<Component> {
        (0..n).map(|_| library::junction(origin())).collect()
    }

    fn j(c: &Component) -> PinRef {
        c.pin_ref("j")
    }

    #[test]
    fn undriven_net_floats() {
        let parts = junctions(1);
        let map = build_nets(&parts, &[]);
        let res = resolve(&map, &DriveSet::default());
        let s = res.at(&j(&parts[0]));
        assert_eq!(s.level, NetLevel::Floating);
        assert!(!s.reads_high());
        assert!(!s.sinks());
    }

    #[test]
    fn strong_driver_sets_level() {
        let parts = junctions(2);
        let wires = vec![Wire::between(j(&parts[0]), j(&parts[1]))];
        let map = build_nets(&parts, &wires);
        let drive = DriveSet {
            drivers: vec![Driver::strong(j(&parts[0]), Level::High)],
            ..Default::default()
        };
        let res = resolve(&map, &drive);
        assert_eq!(res.at(&j(&parts[1])).level, NetLevel::High);
        assert_eq!(res.at(&j(&parts[1])).strength, Strength::Strong);
    }

    #[test]
    fn conflicting_drivers_are_contested() {
        let parts = junctions(2);
        let map = build_nets(&parts, &[Wire::between(j(&parts[0]), j(&parts[1]))]);
        let drive = DriveSet {
            drivers: vec![
                Driver::strong(j(&parts[0]), Level::High),
                Driver::strong(j(&parts[1]), Level::Low),
            ],
            ..Default::default()
        };
        let res = resolve(&map, &drive);
        assert!(res.at(&j(&parts[0])).is_contested());
    }

    #[test]
    fn closed_switch_carries_level_same_tick() {
        let parts = junctions(2);
        let map = build_nets(&parts, &[]);
        let drive = DriveSet {
            drivers: vec![Driver::strong(j(&parts[0]), Level::High)],
            switches: vec![(j(&parts[0]), j(&parts[1]))],
            ..Default::default()
        };
        let res = resolve(&map, &drive);
        let s = res.at(&j(&parts[1]));
        assert_eq!(s.level, NetLevel::High);
        assert_eq!(s.drivers[0].pin, j(&parts[1]));
    }

    #[test]
    fn switch_chain_propagates() {
        let parts = junctions(3);
        let map = build_nets(&parts, &[]);
        let drive = DriveSet {
            drivers: vec![Driver::strong(j(&parts[2]), Level::Low)],
            switches: vec![(j(&parts[0]), j(&parts[1])), (j(&parts[1]), j(&parts[2]))],
            ..Default::default()
        };
        let res = resolve(&map, &drive);
        assert_eq!(res.at(&j(&parts[0])).level, NetLevel::Low);
    }

    #[test]
    fn resistor_pulls_undriven_net() {
        let parts = junctions(3);
        let map = build_nets(&parts, &[]);
        let drive = DriveSet {
            drivers: vec![Driver::strong(j(&parts[0]), Level::Low)],
            resistors: vec![(j(&parts[0]), j(&parts[1])), (j(&parts[1]), j(&parts[2]))],
            ..Default::default()
        };
        let res = resolve(&map, &drive);
        for p in &parts[1..] {
            let s = res.at(&j(p));
            assert_eq!(s.level, NetLevel::Low);
            assert_eq!(s.strength, Strength::Pulled);
            assert!(s.sinks());
        }
    }

    #[test]
    fn opposing_pulls_leave_net_floating() {
        let parts = junctions(3);
        let map = build_nets(&parts, &[]);
        let drive = DriveSet {
            drivers: vec![
                Driver::strong(j(&parts[0]), Level::High),
                Driver::strong(j(&parts[2]), Level::Low),
            ],
            resistors: vec![(j(&parts[0]), j(&parts[1])), (j(&parts[1]), j(&parts[2]))],
            ..Default::default()
        };
        let res = resolve(&map, &drive);
        assert_eq!(res.at(&j(&parts[1])).level, NetLevel::Floating);
    }

    #[test]
    fn analog_drivers_average() {
        let parts = junctions(2);
        let map = build_nets(&parts, &[Wire::between(j(&parts[0]), j(&parts[1]))]);
        let drive = DriveSet {
            drivers: vec![
                Driver::analog(j(&parts[0]), Fixed64::from_num(0.25)),
                Driver::analog(j(&parts[1]), Fixed64::from_num(0.75)),
            ],
            ..Default::default()
        };
        let res = resolve(&map, &drive);
        let s = res.at(&j(&parts[0]));
        assert_eq!(s.level, NetLevel::Analog(Fixed64::from_num(0.5)));
        assert!(s.reads_high());
    }

    #[test]
    fn strong_beats_analog() {
        let parts = junctions(1);
        let map = build_nets(&parts, &[]);
        let drive = DriveSet {
            drivers: vec![
                Driver::analog(j(&parts[0]), Fixed64::from_num(0.9)),
                Driver::strong(j(&parts[0]), Level::Low),
            ],
            ..Default::default()
        };
        let res = resolve(&map, &drive);
        assert_eq!(res.at(&j(&parts[0])).level, NetLevel::Low);
    }

    #[test]
    fn unknown_pin_reads_undriven() {
        let parts = junctions(1);
        let map = build_nets(&parts, &[]);
        let res = resolve(&map, &DriveSet::default());
        assert_eq!(res.at(&PinRef::new("ghost", "x")).level, NetLevel::Floating);
    }
}
