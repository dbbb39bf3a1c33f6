//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::component::{Component, Position, PropValue, Wire};
use crate::fixed::Fixed64;
use crate::id::ComponentId;
use crate::library;
use crate::sim::SimState;

// ===========================================================================
// Small helpers
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

pub fn origin() -> Position {
    Position::default()
}

/// Build a state from parts and wires, panicking on invalid topology.
pub fn state_of(seed: u64, parts: Vec<Component>, wires: Vec<Wire>) -> SimState {
    let mut state = SimState::new(seed);
    for c in parts {
        state.add_component(c).expect("fixture component");
    }
    for w in wires {
        state.add_wire(w).expect("fixture wire");
    }
    state
}

// ===========================================================================
// LED circuit: board GPIO2 -> LED -> 220 ohm -> ground rail
// ===========================================================================

/// Board pin driving the fixture LED.
pub const LED_PIN: &str = "GPIO2";

pub struct LedCircuit {
    pub parts: Vec<Component>,
    /// The resistor-to-ground wire is last.
    pub wires: Vec<Wire>,
    pub board: ComponentId,
    pub led: ComponentId,
    pub resistor: ComponentId,
}

pub fn led_circuit() -> LedCircuit {
    let board = library::board(origin());
    let led = library::led(origin());
    let resistor = library::resistor(origin(), 220);
    let gnd = library::ground_rail(origin());
    let wires = vec![
        Wire::between(board.pin_ref(LED_PIN), led.pin_ref("anode")),
        Wire::between(led.pin_ref("cathode"), resistor.pin_ref("a")),
        Wire::between(resistor.pin_ref("b"), gnd.pin_ref("g1")),
    ];
    LedCircuit {
        board: board.id.clone(),
        led: led.id.clone(),
        resistor: resistor.id.clone(),
        parts: vec![board, led, resistor, gnd],
        wires,
    }
}

impl LedCircuit {
    fn part(&self, id: &ComponentId) -> &Component {
        self.parts.iter().find(|c| &c.id == id).expect("fixture part")
    }

    /// Write the board's output prop directly, bypassing the command queue.
    pub fn set_output(&mut self, high: bool) {
        let board = self.board.clone();
        let c = self.parts.iter_mut().find(|c| c.id == board).expect("fixture board");
        c.props.set_bool(library::board_output_key(LED_PIN), high);
    }

    pub fn led_prop(&self, key: &str) -> PropValue {
        self.part(&self.led).props.get(key).cloned().expect("led prop")
    }

    pub fn into_state(self, seed: u64) -> SimState {
        state_of(seed, self.parts, self.wires)
    }
}

// ===========================================================================
// Button circuit: 3V3 -> button -> GPIO16, pulled down through 10k to GND1
// ===========================================================================

pub const BUTTON_PIN: &str = "GPIO16";

pub struct ButtonCircuit {
    pub state: SimState,
    pub board: ComponentId,
    pub button: ComponentId,
}

pub fn button_circuit(seed: u64) -> ButtonCircuit {
    let board = library::board(origin());
    let button = library::button(origin());
    let pull_down = library::resistor(origin(), 10_000);
    let wires = vec![
        Wire::between(board.pin_ref("3V3"), button.pin_ref("a")),
        Wire::between(button.pin_ref("b"), board.pin_ref(BUTTON_PIN)),
        Wire::between(board.pin_ref(BUTTON_PIN), pull_down.pin_ref("a")),
        Wire::between(pull_down.pin_ref("b"), board.pin_ref("GND1")),
    ];
    ButtonCircuit {
        board: board.id.clone(),
        button: button.id.clone(),
        state: state_of(seed, vec![board, button, pull_down], wires),
    }
}

// ===========================================================================
// Mixed board: every moving part, for runtime comparisons
// ===========================================================================

pub struct MixedBoard {
    pub state: SimState,
    pub board: ComponentId,
    pub led: ComponentId,
    pub button: ComponentId,
    pub servo: ComponentId,
    pub pot: ComponentId,
    pub temperature: ComponentId,
    pub distance: ComponentId,
    pub motion: ComponentId,
}

/// LED on GPIO2, button on GPIO16, servo on GPIO25, pot on GPIO35,
/// temperature on GPIO34, distance echo on GPIO32, motion on GPIO17.
pub fn mixed_board(seed: u64) -> MixedBoard {
    let LedCircuit {
        mut parts,
        mut wires,
        board,
        led,
        ..
    } = led_circuit();
    let ButtonCircuit {
        state: button_state,
        button,
        board: button_board,
    } = button_circuit(seed);

    // Rewire the button fixture onto the LED fixture's board.
    for c in button_state.components {
        if c.id != button_board {
            parts.push(c);
        }
    }
    for mut w in button_state.wires {
        for end in [&mut w.a, &mut w.b] {
            if end.component == button_board {
                end.component = board.clone();
            }
        }
        wires.push(w);
    }

    let servo = library::servo(origin());
    let pot = library::potentiometer(origin());
    let temperature = library::temperature_sensor(origin());
    let distance = library::distance_sensor(origin());
    let motion = library::motion_sensor(origin());
    let vcc = library::power_rail(origin());
    let gnd = library::ground_rail(origin());
    let b = |pin: &str| crate::id::PinRef::new(&board, pin);

    wires.extend([
        Wire::between(b("3V3"), vcc.pin_ref("v1")),
        Wire::between(b("GND2"), gnd.pin_ref("g1")),
        Wire::between(b("GPIO25"), servo.pin_ref("signal")),
        Wire::between(vcc.pin_ref("v2"), pot.pin_ref("vcc")),
        Wire::between(gnd.pin_ref("g2"), pot.pin_ref("gnd")),
        Wire::between(b("GPIO35"), pot.pin_ref("wiper")),
        Wire::between(vcc.pin_ref("v3"), temperature.pin_ref("vcc")),
        Wire::between(gnd.pin_ref("g3"), temperature.pin_ref("gnd")),
        Wire::between(b("GPIO34"), temperature.pin_ref("out")),
        Wire::between(vcc.pin_ref("v4"), distance.pin_ref("vcc")),
        Wire::between(gnd.pin_ref("g4"), distance.pin_ref("gnd")),
        Wire::between(b("GPIO32"), distance.pin_ref("echo")),
        Wire::between(vcc.pin_ref("v5"), motion.pin_ref("vcc")),
        Wire::between(gnd.pin_ref("g5"), motion.pin_ref("gnd")),
        Wire::between(b("GPIO17"), motion.pin_ref("out")),
    ]);

    let ids = (
        servo.id.clone(),
        pot.id.clone(),
        temperature.id.clone(),
        distance.id.clone(),
        motion.id.clone(),
    );
    parts.extend([servo, pot, temperature, distance, motion, vcc, gnd]);

    MixedBoard {
        state: state_of(seed, parts, wires),
        board,
        led,
        button,
        servo: ids.0,
        pot: ids.1,
        temperature: ids.2,
        distance: ids.3,
        motion: ids.4,
    }
}

// ===========================================================================
// Large boards for benchmarks and property tests
// ===========================================================================

/// `n` LED/resistor pairs hanging off junction chains, with every fourth
/// junction wired to its neighbor.
pub fn large_board(n: usize) -> (Vec<Component>, Vec<Wire>) {
    let mut parts = Vec::with_capacity(n * 3);
    let mut wires = Vec::with_capacity(n * 3);
    let mut prev: Option<Component> = None;
    for i in 0..n {
        let j = library::junction(origin());
        let led = library::led(origin());
        let r = library::resistor(origin(), 220);
        wires.push(Wire::between(j.pin_ref("j"), led.pin_ref("anode")));
        wires.push(Wire::between(led.pin_ref("cathode"), r.pin_ref("a")));
        if let Some(p) = &prev
            && i % 4 != 0
        {
            wires.push(Wire::between(p.pin_ref("j"), j.pin_ref("j")));
        }
        prev = Some(j.clone());
        parts.extend([j, led, r]);
    }
    (parts, wires)
}
