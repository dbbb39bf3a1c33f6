use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Identifies an event-bus subscription. Returned by `subscribe`, consumed
    /// by `unsubscribe`.
    pub struct SubscriptionId;
}

/// Identifies a component on the board. Unique within a [`SimState`](crate::sim::SimState).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub String);

/// Identifies a wire. Unique within a [`SimState`](crate::sim::SimState).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireId(pub String);

/// Identifies a pin. Unique only within its owning component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PinId(pub String);

/// Identifies a net produced by one net build. Not stable across rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetId(pub u32);

/// A fully qualified pin: the owning component plus the pin within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PinRef {
    pub component: ComponentId,
    pub pin: PinId,
}

const GENERATED_SUFFIX_LEN: usize = 10;

impl ComponentId {
    /// Generate a fresh id of the form `<prefix>-<random suffix>`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", nanoid::nanoid!(GENERATED_SUFFIX_LEN)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl WireId {
    /// Generate a fresh id of the form `wire-<random suffix>`.
    pub fn generate() -> Self {
        Self(format!("wire-{}", nanoid::nanoid!(GENERATED_SUFFIX_LEN)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PinId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PinRef {
    pub fn new(component: impl Into<ComponentId>, pin: impl Into<PinId>) -> Self {
        Self {
            component: component.into(),
            pin: pin.into(),
        }
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for WireId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for PinId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&ComponentId> for ComponentId {
    fn from(id: &ComponentId) -> Self {
        id.clone()
    }
}

impl From<&PinId> for PinId {
    fn from(id: &PinId) -> Self {
        id.clone()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.pin)
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_component_ids_differ() {
        let a = ComponentId::generate("led");
        let b = ComponentId::generate("led");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("led-"));
    }

    #[test]
    fn generated_wire_ids_differ() {
        assert_ne!(WireId::generate(), WireId::generate());
    }

    #[test]
    fn pin_ref_display() {
        let r = PinRef::new("board-1", "GPIO2");
        assert_eq!(r.to_string(), "board-1.GPIO2");
    }

    #[test]
    fn pin_refs_order_by_component_then_pin() {
        let a = PinRef::new("a", "z");
        let b = PinRef::new("b", "a");
        assert!(a < b);
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(PinRef::new("led-1", "anode"), 1);
        assert_eq!(map[&PinRef::new("led-1", "anode")], 1);
    }
}
