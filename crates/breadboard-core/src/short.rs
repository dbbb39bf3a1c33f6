//! Short-circuit detection.
//!
//! After resolution, any net whose strong drivers assert both HIGH and LOW
//! is clamped to [`NetLevel::Short`] so dependents render a fault instead of
//! an arbitrary level. The clamp is recomputed every tick; an event is
//! published only when a short first appears, and re-armed once it clears.
//!
//! A short is identified across ticks by the smallest pin reference among
//! its nets, since [`NetId`]s are not stable across rebuilds. Nets bridged by
//! a pressed button count as one short.

use std::collections::{BTreeMap, BTreeSet};

use crate::event::{ShortDriver, SimEvent};
use crate::fixed::Ticks;
use crate::id::{NetId, PinRef};
use crate::signal::{NetLevel, Resolution};

#[derive(Debug, Clone, Default)]
pub struct ShortCircuitDetector {
    active: BTreeSet<PinRef>,
}

impl ShortCircuitDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamp contested nets and return events for newly appeared shorts.
    ///
    /// Contested nets joined by closed switches are one fault: they share a
    /// key and a single event that names every driver involved.
    pub fn scan(&mut self, resolution: &mut Resolution<'_>, tick: Ticks) -> Vec<SimEvent> {
        let map = resolution.map();
        let mut groups: BTreeMap<NetId, Vec<NetId>> = BTreeMap::new();
        for (net, state) in resolution.iter() {
            if state.is_contested() {
                groups.entry(resolution.group_of(net)).or_default().push(net);
            }
        }

        let mut events = Vec::new();
        let mut now_active = BTreeSet::new();
        for nets in groups.into_values() {
            let mut key: Option<&PinRef> = None;
            let mut drivers: Vec<ShortDriver> = Vec::new();
            for &net in &nets {
                if let Some(first) = map.members(net).first() {
                    key = Some(key.map_or(first, |k| k.min(first)));
                }
                let Some(state) = resolution.state_mut(net) else {
                    continue;
                };
                state.level = NetLevel::Short;
                for d in &state.drivers {
                    let Some(level) = d.strong_level() else {
                        continue;
                    };
                    let entry = ShortDriver {
                        component: d.pin.component.clone(),
                        pin: d.pin.pin.clone(),
                        level,
                    };
                    if !drivers.contains(&entry) {
                        drivers.push(entry);
                    }
                }
            }
            let (Some(key), Some(&net)) = (key, nets.first()) else {
                continue;
            };
            now_active.insert(key.clone());
            if self.active.contains(key) {
                continue;
            }
            log::warn!(
                "short circuit on {net} at tick {tick}: {}",
                drivers
                    .iter()
                    .map(|d| format!("{}.{}={:?}", d.component, d.pin, d.level))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            events.push(SimEvent::ShortCircuit { net, drivers, tick });
        }

        self.active = now_active;
        events
    }

    /// Number of shorts present after the last scan.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Forget every known short so the next scan reports them again.
    pub fn reset(&mut self) {
        self.active.clear();
    }
}
