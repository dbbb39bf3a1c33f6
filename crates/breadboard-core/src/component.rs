//! Board data model: components, their pins, wires, and the property bag.
//!
//! Components are plain data. Behavior lives in [`crate::behavior`]; pin
//! layouts and default props live in [`crate::library`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;
use crate::id::{ComponentId, PinId, PinRef, WireId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Canvas position in renderer units. Display-only; never read by the tick loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ---------------------------------------------------------------------------
// Pins
// ---------------------------------------------------------------------------

/// Electrical role of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinKind {
    Digital,
    Analog,
    Power,
    Ground,
    Pwm,
    I2c,
    Spi,
}

/// A connection point on a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub id: PinId,
    pub label: String,
    pub kind: PinKind,
    /// Board GPIO index, for microcontroller pins only.
    #[serde(default)]
    pub gpio: Option<u8>,
    /// Offset from the component origin, in renderer units.
    pub offset: Position,
}

// ---------------------------------------------------------------------------
// Component kinds
// ---------------------------------------------------------------------------

/// Every part the library can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Board,
    Led,
    Button,
    Buzzer,
    Potentiometer,
    MotionSensor,
    DistanceSensor,
    TemperatureSensor,
    Servo,
    Resistor,
    Capacitor,
    PowerRail,
    GroundRail,
    Junction,
}

impl ComponentKind {
    /// Prefix used when generating ids for this kind.
    pub fn id_prefix(self) -> &'static str {
        match self {
            ComponentKind::Board => "board",
            ComponentKind::Led => "led",
            ComponentKind::Button => "button",
            ComponentKind::Buzzer => "buzzer",
            ComponentKind::Potentiometer => "pot",
            ComponentKind::MotionSensor => "pir",
            ComponentKind::DistanceSensor => "ultrasonic",
            ComponentKind::TemperatureSensor => "temp",
            ComponentKind::Servo => "servo",
            ComponentKind::Resistor => "resistor",
            ComponentKind::Capacitor => "capacitor",
            ComponentKind::PowerRail => "vcc-rail",
            ComponentKind::GroundRail => "gnd-rail",
            ComponentKind::Junction => "junction",
        }
    }

    /// Whether current flows between this part's two terminals at DC.
    pub fn conducts(self) -> bool {
        matches!(self, ComponentKind::Resistor)
    }
}

// ---------------------------------------------------------------------------
// Property bag
// ---------------------------------------------------------------------------

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    Bool(bool),
    Number(Fixed64),
    Text(String),
}

/// Errors raised when a property is missing or holds the wrong type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropError {
    #[error("property '{0}' is missing")]
    Missing(String),
    #[error("property '{key}' should be {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Type-specific component state, ordered by key for deterministic iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Props(BTreeMap<String, PropValue>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set a property. Returns `true` if the stored value changed.
    pub fn set(&mut self, key: impl Into<String>, value: PropValue) -> bool {
        let key = key.into();
        if self.0.get(&key) == Some(&value) {
            return false;
        }
        self.0.insert(key, value);
        true
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) -> bool {
        self.set(key, PropValue::Bool(value))
    }

    pub fn set_number(&mut self, key: impl Into<String>, value: Fixed64) -> bool {
        self.set(key, PropValue::Number(value))
    }

    /// Remove a property. Returns `true` if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.0.remove(key).is_some()
    }

    pub fn bool(&self, key: &str) -> Result<bool, PropError> {
        match self.0.get(key) {
            Some(PropValue::Bool(b)) => Ok(*b),
            Some(_) => Err(PropError::WrongType {
                key: key.to_string(),
                expected: "a bool",
            }),
            None => Err(PropError::Missing(key.to_string())),
        }
    }

    pub fn number(&self, key: &str) -> Result<Fixed64, PropError> {
        match self.0.get(key) {
            Some(PropValue::Number(n)) => Ok(*n),
            Some(_) => Err(PropError::WrongType {
                key: key.to_string(),
                expected: "a number",
            }),
            None => Err(PropError::Missing(key.to_string())),
        }
    }

    /// Like [`Props::number`] but a missing key is `Ok(None)`.
    pub fn optional_number(&self, key: &str) -> Result<Option<Fixed64>, PropError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(PropValue::Number(n)) => Ok(Some(*n)),
            Some(_) => Err(PropError::WrongType {
                key: key.to_string(),
                expected: "a number",
            }),
        }
    }

    /// Like [`Props::bool`] but a missing key is `Ok(None)`.
    pub fn optional_bool(&self, key: &str) -> Result<Option<bool>, PropError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(PropValue::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(PropError::WrongType {
                key: key.to_string(),
                expected: "a bool",
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, PropValue)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, PropValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ---------------------------------------------------------------------------
// Component & wire
// ---------------------------------------------------------------------------

/// A placed part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub position: Position,
    /// Rotation in degrees, clockwise.
    pub rotation: u16,
    pub pins: Vec<Pin>,
    pub props: Props,
}

impl Component {
    pub fn pin(&self, id: &str) -> Option<&Pin> {
        self.pins.iter().find(|p| p.id.as_str() == id)
    }

    pub fn has_pin(&self, id: &PinId) -> bool {
        self.pins.iter().any(|p| &p.id == id)
    }

    /// Fully qualified reference to one of this component's pins.
    pub fn pin_ref(&self, pin: &str) -> PinRef {
        PinRef::new(&self.id, pin)
    }
}

/// A wire between two pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    pub id: WireId,
    pub a: PinRef,
    pub b: PinRef,
    pub color: String,
}

impl Wire {
    /// A wire with a generated id and the default color.
    pub fn between(a: PinRef, b: PinRef) -> Self {
        Self {
            id: WireId::generate(),
            a,
            b,
            color: DEFAULT_WIRE_COLOR.to_string(),
        }
    }

    /// Whether either endpoint belongs to `component`.
    pub fn touches(&self, component: &ComponentId) -> bool {
        &self.a.component == component || &self.b.component == component
    }
}

pub const DEFAULT_WIRE_COLOR: &str = "#2f80ed";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_change() {
        let mut props = Props::new();
        assert!(props.set_bool("active", true));
        assert!(!props.set_bool("active", true));
        assert!(props.set_bool("active", false));
    }

    #[test]
    fn typed_getters() {
        let mut props = Props::new();
        props.set_number("angle", Fixed64::from_num(90));
        props.set("label", PropValue::Text("x".into()));

        assert_eq!(props.number("angle").unwrap(), Fixed64::from_num(90));
        assert_eq!(
            props.bool("angle"),
            Err(PropError::WrongType {
                key: "angle".into(),
                expected: "a bool"
            })
        );
        assert_eq!(props.number("missing"), Err(PropError::Missing("missing".into())));
        assert!(props.number("label").is_err());
    }

    #[test]
    fn optional_getters() {
        let mut props = Props::new();
        assert_eq!(props.optional_number("stimulus").unwrap(), None);
        props.set_number("stimulus", Fixed64::from_num(3));
        assert_eq!(props.optional_number("stimulus").unwrap(), Some(Fixed64::from_num(3)));
        props.set_bool("stimulus", true);
        assert!(props.optional_number("stimulus").is_err());
    }

    #[test]
    fn remove_reports_presence() {
        let mut props: Props = [("out.GPIO2", PropValue::Bool(true))].into_iter().collect();
        assert!(props.remove("out.GPIO2"));
        assert!(!props.remove("out.GPIO2"));
        assert!(props.is_empty());
    }

    #[test]
    fn wire_touches_both_endpoints() {
        let w = Wire::between(PinRef::new("a", "1"), PinRef::new("b", "2"));
        assert!(w.touches(&ComponentId::from("a")));
        assert!(w.touches(&ComponentId::from("b")));
        assert!(!w.touches(&ComponentId::from("c")));
    }

    #[test]
    fn only_resistors_conduct() {
        assert!(ComponentKind::Resistor.conducts());
        assert!(!ComponentKind::Capacitor.conducts());
        assert!(!ComponentKind::Led.conducts());
    }
}
