//! Component library: factories producing parts with fixed pin layouts.
//!
//! Every factory returns a [`Component`] with a freshly generated id, the
//! kind's stable pin set, and its default props. Factories have no side
//! effects beyond construction.

use crate::component::{Component, ComponentKind, Pin, PinKind, Position, PropValue, Props};
use crate::fixed::Fixed64;
use crate::id::{ComponentId, PinId};

// ---------------------------------------------------------------------------
// Prop keys
// ---------------------------------------------------------------------------

pub const PROP_ACTIVE: &str = "active";
pub const PROP_FAULT: &str = "fault";
pub const PROP_COLOR: &str = "color";
pub const PROP_PRESSED: &str = "pressed";
pub const PROP_WIPER: &str = "wiper";
pub const PROP_OUTPUT: &str = "output";
pub const PROP_POWERED: &str = "powered";
pub const PROP_STIMULUS: &str = "stimulus";
pub const PROP_MOTION: &str = "motion";
pub const PROP_DISTANCE_CM: &str = "distance_cm";
pub const PROP_TEMPERATURE_C: &str = "temperature_c";
pub const PROP_ANGLE: &str = "angle";
pub const PROP_TARGET: &str = "target";
pub const PROP_RESISTANCE: &str = "resistance";
pub const PROP_CAPACITANCE: &str = "capacitance";

/// Board prop holding a digital output level, e.g. `out.GPIO2`.
pub fn board_output_key(pin: &str) -> String {
    format!("out.{pin}")
}

/// Board prop holding a PWM duty cycle in [0, 1], e.g. `pwm.GPIO25`.
pub fn board_pwm_key(pin: &str) -> String {
    format!("pwm.{pin}")
}

/// Board prop holding the sampled digital level of an input pin.
pub fn board_input_key(pin: &str) -> String {
    format!("in.{pin}")
}

/// Board prop holding the sampled 12-bit ADC reading of an analog pin.
pub fn board_adc_key(pin: &str) -> String {
    format!("adc.{pin}")
}

// ---------------------------------------------------------------------------
// Board pin table
// ---------------------------------------------------------------------------

/// (pin id, kind, gpio index) for the dev board, in header order.
const BOARD_PINS: &[(&str, PinKind, Option<u8>)] = &[
    ("3V3", PinKind::Power, None),
    ("GND1", PinKind::Ground, None),
    ("GPIO15", PinKind::Pwm, Some(15)),
    ("GPIO2", PinKind::Pwm, Some(2)),
    ("GPIO4", PinKind::Pwm, Some(4)),
    ("GPIO16", PinKind::Digital, Some(16)),
    ("GPIO17", PinKind::Digital, Some(17)),
    ("GPIO5", PinKind::Pwm, Some(5)),
    ("GPIO18", PinKind::Spi, Some(18)),
    ("GPIO19", PinKind::Spi, Some(19)),
    ("GPIO21", PinKind::I2c, Some(21)),
    ("GPIO22", PinKind::I2c, Some(22)),
    ("GPIO23", PinKind::Spi, Some(23)),
    ("5V", PinKind::Power, None),
    ("GND2", PinKind::Ground, None),
    ("GPIO13", PinKind::Pwm, Some(13)),
    ("GPIO12", PinKind::Pwm, Some(12)),
    ("GPIO14", PinKind::Pwm, Some(14)),
    ("GPIO27", PinKind::Pwm, Some(27)),
    ("GPIO26", PinKind::Pwm, Some(26)),
    ("GPIO25", PinKind::Pwm, Some(25)),
    ("GPIO33", PinKind::Analog, Some(33)),
    ("GPIO32", PinKind::Analog, Some(32)),
    ("GPIO35", PinKind::Analog, Some(35)),
    ("GPIO34", PinKind::Analog, Some(34)),
    ("GPIO39", PinKind::Analog, Some(39)),
    ("GPIO36", PinKind::Analog, Some(36)),
];

/// Header pitch in renderer units.
const PITCH: f64 = 10.0;

/// Pins per board header column.
const BOARD_COLUMN: usize = 13;

/// Number of holes on a power or ground rail.
pub const RAIL_LENGTH: usize = 5;

fn pin(id: &str, label: &str, kind: PinKind, dx: f64, dy: f64) -> Pin {
    Pin {
        id: PinId(id.to_string()),
        label: label.to_string(),
        kind,
        gpio: None,
        offset: Position::new(dx, dy),
    }
}

fn build(kind: ComponentKind, at: Position, pins: Vec<Pin>) -> Component {
    Component {
        id: ComponentId::generate(kind.id_prefix()),
        kind,
        position: at,
        rotation: 0,
        pins,
        props: default_props(kind),
    }
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// ESP32-style dev board with two header columns.
pub fn board(at: Position) -> Component {
    let pins = BOARD_PINS
        .iter()
        .enumerate()
        .map(|(i, &(id, kind, gpio))| {
            let (col, row) = (i / BOARD_COLUMN, i % BOARD_COLUMN);
            let mut p = pin(id, id, kind, col as f64 * 8.0 * PITCH, row as f64 * PITCH);
            p.gpio = gpio;
            p
        })
        .collect();
    build(ComponentKind::Board, at, pins)
}

pub fn led(at: Position) -> Component {
    build(
        ComponentKind::Led,
        at,
        vec![
            pin("anode", "+", PinKind::Digital, 0.0, PITCH),
            pin("cathode", "-", PinKind::Ground, PITCH, PITCH),
        ],
    )
}

pub fn button(at: Position) -> Component {
    build(
        ComponentKind::Button,
        at,
        vec![
            pin("a", "A", PinKind::Digital, 0.0, 0.0),
            pin("b", "B", PinKind::Digital, 2.0 * PITCH, 0.0),
        ],
    )
}

pub fn buzzer(at: Position) -> Component {
    build(
        ComponentKind::Buzzer,
        at,
        vec![
            pin("pos", "+", PinKind::Digital, 0.0, PITCH),
            pin("neg", "-", PinKind::Ground, PITCH, PITCH),
        ],
    )
}

pub fn potentiometer(at: Position) -> Component {
    build(
        ComponentKind::Potentiometer,
        at,
        vec![
            pin("vcc", "VCC", PinKind::Power, 0.0, PITCH),
            pin("wiper", "OUT", PinKind::Analog, PITCH, PITCH),
            pin("gnd", "GND", PinKind::Ground, 2.0 * PITCH, PITCH),
        ],
    )
}

/// PIR motion sensor with a digital output.
pub fn motion_sensor(at: Position) -> Component {
    build(
        ComponentKind::MotionSensor,
        at,
        vec![
            pin("vcc", "VCC", PinKind::Power, 0.0, PITCH),
            pin("out", "OUT", PinKind::Digital, PITCH, PITCH),
            pin("gnd", "GND", PinKind::Ground, 2.0 * PITCH, PITCH),
        ],
    )
}

/// HC-SR04 style ultrasonic distance sensor.
pub fn distance_sensor(at: Position) -> Component {
    build(
        ComponentKind::DistanceSensor,
        at,
        vec![
            pin("vcc", "VCC", PinKind::Power, 0.0, PITCH),
            pin("trig", "TRIG", PinKind::Digital, PITCH, PITCH),
            pin("echo", "ECHO", PinKind::Digital, 2.0 * PITCH, PITCH),
            pin("gnd", "GND", PinKind::Ground, 3.0 * PITCH, PITCH),
        ],
    )
}

/// TMP36 style analog temperature sensor.
pub fn temperature_sensor(at: Position) -> Component {
    build(
        ComponentKind::TemperatureSensor,
        at,
        vec![
            pin("vcc", "VCC", PinKind::Power, 0.0, PITCH),
            pin("out", "VOUT", PinKind::Analog, PITCH, PITCH),
            pin("gnd", "GND", PinKind::Ground, 2.0 * PITCH, PITCH),
        ],
    )
}

pub fn servo(at: Position) -> Component {
    build(
        ComponentKind::Servo,
        at,
        vec![
            pin("signal", "SIG", PinKind::Pwm, 0.0, PITCH),
            pin("vcc", "VCC", PinKind::Power, PITCH, PITCH),
            pin("gnd", "GND", PinKind::Ground, 2.0 * PITCH, PITCH),
        ],
    )
}

pub fn resistor(at: Position, ohms: u32) -> Component {
    let mut c = build(
        ComponentKind::Resistor,
        at,
        vec![
            pin("a", "1", PinKind::Digital, 0.0, 0.0),
            pin("b", "2", PinKind::Digital, 4.0 * PITCH, 0.0),
        ],
    );
    c.props.set_number(PROP_RESISTANCE, Fixed64::from_num(ohms));
    c
}

pub fn capacitor(at: Position) -> Component {
    build(
        ComponentKind::Capacitor,
        at,
        vec![
            pin("a", "1", PinKind::Digital, 0.0, 0.0),
            pin("b", "2", PinKind::Digital, 2.0 * PITCH, 0.0),
        ],
    )
}

pub fn power_rail(at: Position) -> Component {
    let pins = (1..=RAIL_LENGTH)
        .map(|i| pin(&format!("v{i}"), "+", PinKind::Power, (i - 1) as f64 * PITCH, 0.0))
        .collect();
    build(ComponentKind::PowerRail, at, pins)
}

pub fn ground_rail(at: Position) -> Component {
    let pins = (1..=RAIL_LENGTH)
        .map(|i| pin(&format!("g{i}"), "-", PinKind::Ground, (i - 1) as f64 * PITCH, 0.0))
        .collect();
    build(ComponentKind::GroundRail, at, pins)
}

/// Single-pin branch point. Created when a wire is split.
pub fn junction(at: Position) -> Component {
    build(
        ComponentKind::Junction,
        at,
        vec![pin("j", "", PinKind::Digital, 0.0, 0.0)],
    )
}

/// Dispatch to the factory for `kind`. Resistors get 220 Ω.
pub fn create(kind: ComponentKind, at: Position) -> Component {
    match kind {
        ComponentKind::Board => board(at),
        ComponentKind::Led => led(at),
        ComponentKind::Button => button(at),
        ComponentKind::Buzzer => buzzer(at),
        ComponentKind::Potentiometer => potentiometer(at),
        ComponentKind::MotionSensor => motion_sensor(at),
        ComponentKind::DistanceSensor => distance_sensor(at),
        ComponentKind::TemperatureSensor => temperature_sensor(at),
        ComponentKind::Servo => servo(at),
        ComponentKind::Resistor => resistor(at, DEFAULT_RESISTANCE),
        ComponentKind::Capacitor => capacitor(at),
        ComponentKind::PowerRail => power_rail(at),
        ComponentKind::GroundRail => ground_rail(at),
        ComponentKind::Junction => junction(at),
    }
}

pub const DEFAULT_RESISTANCE: u32 = 220;

// ---------------------------------------------------------------------------
// Default props
// ---------------------------------------------------------------------------

/// The props a freshly built component of `kind` starts with. Also used to
/// recover a component whose props became malformed.
pub fn default_props(kind: ComponentKind) -> Props {
    let zero = PropValue::Number(Fixed64::ZERO);
    match kind {
        ComponentKind::Led => [
            (PROP_ACTIVE, PropValue::Bool(false)),
            (PROP_FAULT, PropValue::Bool(false)),
            (PROP_COLOR, PropValue::Text("red".into())),
        ]
        .into_iter()
        .collect(),
        ComponentKind::Button => [(PROP_PRESSED, PropValue::Bool(false))].into_iter().collect(),
        ComponentKind::Buzzer => [
            (PROP_ACTIVE, PropValue::Bool(false)),
            (PROP_FAULT, PropValue::Bool(false)),
        ]
        .into_iter()
        .collect(),
        ComponentKind::Potentiometer => [
            (PROP_WIPER, PropValue::Number(Fixed64::from_num(0.5))),
            (PROP_OUTPUT, zero),
            (PROP_POWERED, PropValue::Bool(false)),
        ]
        .into_iter()
        .collect(),
        ComponentKind::MotionSensor => [
            (PROP_MOTION, PropValue::Bool(false)),
            (PROP_POWERED, PropValue::Bool(false)),
        ]
        .into_iter()
        .collect(),
        ComponentKind::DistanceSensor => [
            (PROP_DISTANCE_CM, zero),
            (PROP_POWERED, PropValue::Bool(false)),
        ]
        .into_iter()
        .collect(),
        ComponentKind::TemperatureSensor => [
            (PROP_TEMPERATURE_C, zero),
            (PROP_POWERED, PropValue::Bool(false)),
        ]
        .into_iter()
        .collect(),
        ComponentKind::Servo => [
            (PROP_ANGLE, PropValue::Number(Fixed64::from_num(90))),
            (PROP_TARGET, PropValue::Number(Fixed64::from_num(90))),
        ]
        .into_iter()
        .collect(),
        ComponentKind::Resistor => [(
            PROP_RESISTANCE,
            PropValue::Number(Fixed64::from_num(DEFAULT_RESISTANCE)),
        )]
        .into_iter()
        .collect(),
        ComponentKind::Capacitor => [(PROP_CAPACITANCE, PropValue::Number(Fixed64::from_num(10)))]
            .into_iter()
            .collect(),
        ComponentKind::Board
        | ComponentKind::PowerRail
        | ComponentKind::GroundRail
        | ComponentKind::Junction => Props::new(),
    }
}
