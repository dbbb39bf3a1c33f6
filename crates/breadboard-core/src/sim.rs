//! Simulation state: the board contents plus clock, seed, and versioning.
//!
//! [`SimState`] is the unit that crosses the worker boundary. Structural
//! edits go through its methods so that the structural version is bumped
//! exactly when topology changes.

use serde::{Deserialize, Serialize};

use crate::component::{Component, Position, Wire};
use crate::fixed::{Fixed64, Ticks};
use crate::id::{ComponentId, PinRef, WireId};

/// Schema version tag carried by every [`SimState`].
pub const SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Edit errors
// ---------------------------------------------------------------------------

/// Errors raised by structural edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("component id already in use: {0}")]
    DuplicateComponent(ComponentId),
    #[error("wire id already in use: {0}")]
    DuplicateWire(WireId),
    #[error("component not found: {0}")]
    ComponentNotFound(ComponentId),
    #[error("wire not found: {0}")]
    WireNotFound(WireId),
    #[error("pin not found: {0}")]
    PinNotFound(PinRef),
    #[error("component {component} is a {actual}, expected {expected}")]
    WrongKind {
        component: ComponentId,
        expected: &'static str,
        actual: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Everything needed to resume a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    pub components: Vec<Component>,
    pub wires: Vec<Wire>,
    pub running: bool,
    /// Ticks executed so far.
    pub tick: Ticks,
    /// Simulated seconds elapsed (tick length scaled by `time_scale`).
    pub elapsed: Fixed64,
    pub time_scale: Fixed64,
    pub seed: u64,
    pub schema_version: u32,
    /// Bumped on every topology edit. Never bumped by property changes.
    pub structural_version: u64,
}

impl SimState {
    /// An empty, stopped board.
    pub fn new(seed: u64) -> Self {
        Self {
            components: Vec::new(),
            wires: Vec::new(),
            running: false,
            tick: 0,
            elapsed: Fixed64::ZERO,
            time_scale: Fixed64::from_num(1),
            seed,
            schema_version: SCHEMA_VERSION,
            structural_version: 0,
        }
    }

    // -- Lookup --

    pub fn component(&self, id: &ComponentId) -> Option<&Component> {
        self.components.iter().find(|c| &c.id == id)
    }

    pub fn component_mut(&mut self, id: &ComponentId) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| &c.id == id)
    }

    pub fn wire(&self, id: &WireId) -> Option<&Wire> {
        self.wires.iter().find(|w| &w.id == id)
    }

    /// Whether `pin` names an existing pin on an existing component.
    pub fn pin_exists(&self, pin: &PinRef) -> bool {
        self.component(&pin.component)
            .is_some_and(|c| c.has_pin(&pin.pin))
    }

    // -- Structural edits --

    pub fn add_component(&mut self, component: Component) -> Result<(), EditError> {
        if self.component(&component.id).is_some() {
            return Err(EditError::DuplicateComponent(component.id));
        }
        self.components.push(component);
        self.structural_version += 1;
        Ok(())
    }

    /// Remove a component and every wire touching one of its pins.
    pub fn remove_component(&mut self, id: &ComponentId) -> Result<Component, EditError> {
        let idx = self
            .components
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| EditError::ComponentNotFound(id.clone()))?;
        let removed = self.components.remove(idx);
        self.wires.retain(|w| !w.touches(id));
        self.structural_version += 1;
        Ok(removed)
    }

    /// Move or rotate a component. Not a topology change.
    pub fn move_component(
        &mut self,
        id: &ComponentId,
        position: Position,
        rotation: u16,
    ) -> Result<(), EditError> {
        let c = self
            .component_mut(id)
            .ok_or_else(|| EditError::ComponentNotFound(id.clone()))?;
        c.position = position;
        c.rotation = rotation % 360;
        Ok(())
    }

    /// Add a wire. Both endpoints must name existing pins.
    pub fn add_wire(&mut self, wire: Wire) -> Result<(), EditError> {
        if self.wire(&wire.id).is_some() {
            return Err(EditError::DuplicateWire(wire.id));
        }
        for end in [&wire.a, &wire.b] {
            if !self.pin_exists(end) {
                return Err(EditError::PinNotFound(end.clone()));
            }
        }
        self.wires.push(wire);
        self.structural_version += 1;
        Ok(())
    }

    pub fn remove_wire(&mut self, id: &WireId) -> Result<Wire, EditError> {
        let idx = self
            .wires
            .iter()
            .position(|w| &w.id == id)
            .ok_or_else(|| EditError::WireNotFound(id.clone()))?;
        self.structural_version += 1;
        Ok(self.wires.remove(idx))
    }

    /// Component ids followed by wire ids, in list order.
    pub fn structural_ids(&self) -> (Vec<&ComponentId>, Vec<&WireId>) {
        (
            self.components.iter().map(|c| &c.id).collect(),
            self.wires.iter().map(|w| &w.id).collect(),
        )
    }

    /// Deterministic hash of every component's props, used to compare runs.
    pub fn props_hash(&self) -> u64 {
        let mut h = StateHash::new();
        for c in &self.components {
            h.write(c.id.as_str().as_bytes());
            for (k, v) in c.props.iter() {
                h.write(k.as_bytes());
                match v {
                    crate::component::PropValue::Bool(b) => h.write(&[*b as u8]),
                    crate::component::PropValue::Number(n) => h.write_fixed64(*n),
                    crate::component::PropValue::Text(s) => h.write(s.as_bytes()),
                }
            }
        }
        h.finish()
    }
}

impl Default for SimState {
    fn default() -> Self {
        Self::new(0)
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash for comparing simulation states.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
