//! Integration test: short-circuit detection
//!
//! Wires conflicting strong drivers together and checks that exactly one
//! event is raised per short, naming every component involved, that the
//! net degrades to a fault state, and that the short re-arms once cleared.

use breadboard_core::command_queue::Command;
use breadboard_core::component::Wire;
use breadboard_core::engine::Engine;
use breadboard_core::event::SimEvent;
use breadboard_core::id::PinRef;
use breadboard_core::library::{self, PROP_ACTIVE, PROP_FAULT};
use breadboard_core::signal::{Level, NetLevel};
use breadboard_core::test_utils::*;

fn shorts(events: &[SimEvent]) -> Vec<&SimEvent> {
    events
        .iter()
        .filter(|e| matches!(e, SimEvent::ShortCircuit { .. }))
        .collect()
}

#[test]
fn output_pin_tied_to_ground_rail_reports_one_short() {
    let board = library::board(origin());
    let gnd = library::ground_rail(origin());
    let wire = Wire::between(board.pin_ref(LED_PIN), gnd.pin_ref("g1"));
    let (board_id, gnd_id) = (board.id.clone(), gnd.id.clone());
    let mut engine = Engine::new(state_of(1, vec![board, gnd], vec![wire]));

    engine.submit(Command::SetPinOutput {
        board: board_id.clone(),
        pin: LED_PIN.into(),
        level: Some(true),
    });
    let events = engine.run(10);
    let found = shorts(&events);
    assert_eq!(found.len(), 1, "reported once while it persists");

    let SimEvent::ShortCircuit { drivers, tick, .. } = found[0] else {
        unreachable!()
    };
    assert_eq!(*tick, 0);
    assert!(
        drivers
            .iter()
            .any(|d| d.component == board_id && d.level == Level::High)
    );
    assert!(drivers.iter().any(|d| d.component == gnd_id && d.level == Level::Low));
    assert_eq!(engine.level_at(&PinRef::new(&gnd_id, "g1")), Some(NetLevel::Short));
}

#[test]
fn output_low_into_ground_is_not_a_short() {
    let board = library::board(origin());
    let gnd = library::ground_rail(origin());
    let wire = Wire::between(board.pin_ref(LED_PIN), gnd.pin_ref("g1"));
    let board_id = board.id.clone();
    let mut engine = Engine::new(state_of(1, vec![board, gnd], vec![wire]));
    engine.submit(Command::SetPinOutput {
        board: board_id,
        pin: LED_PIN.into(),
        level: Some(false),
    });
    assert!(shorts(&engine.run(3)).is_empty());
}

#[test]
fn rail_to_rail_short_names_both_rails() {
    let vcc = library::power_rail(origin());
    let gnd = library::ground_rail(origin());
    let wire = Wire::between(vcc.pin_ref("v1"), gnd.pin_ref("g1"));
    let (vcc_id, gnd_id) = (vcc.id.clone(), gnd.id.clone());
    let mut engine = Engine::new(state_of(1, vec![vcc, gnd], vec![wire]));

    let events = engine.run(1);
    let found = shorts(&events);
    assert_eq!(found.len(), 1);
    let SimEvent::ShortCircuit { drivers, .. } = found[0] else {
        unreachable!()
    };
    let named: Vec<_> = drivers.iter().map(|d| d.component.clone()).collect();
    assert!(named.contains(&vcc_id));
    assert!(named.contains(&gnd_id));
}

#[test]
fn button_between_rails_is_one_short() {
    let vcc = library::power_rail(origin());
    let gnd = library::ground_rail(origin());
    let button = library::button(origin());
    let wires = vec![
        Wire::between(vcc.pin_ref("v1"), button.pin_ref("a")),
        Wire::between(button.pin_ref("b"), gnd.pin_ref("g1")),
    ];
    let (vcc_id, gnd_id, button_id) = (vcc.id.clone(), gnd.id.clone(), button.id.clone());
    let mut engine = Engine::new(state_of(1, vec![vcc, gnd, button], wires));

    assert!(shorts(&engine.run(2)).is_empty());

    engine.submit(Command::SetButton {
        id: button_id.clone(),
        pressed: true,
    });
    let events = engine.run(5);
    let found = shorts(&events);
    assert_eq!(found.len(), 1, "one fault, one event");
    let SimEvent::ShortCircuit { drivers, .. } = found[0] else {
        unreachable!()
    };
    assert!(drivers.iter().any(|d| d.component == vcc_id && d.level == Level::High));
    assert!(drivers.iter().any(|d| d.component == gnd_id && d.level == Level::Low));

    // Release clears it; pressing again reports it once more.
    engine.submit(Command::SetButton {
        id: button_id.clone(),
        pressed: false,
    });
    assert!(shorts(&engine.run(2)).is_empty());
    engine.submit(Command::SetButton {
        id: button_id,
        pressed: true,
    });
    assert_eq!(shorts(&engine.run(3)).len(), 1);
}

#[test]
fn led_on_shorted_net_shows_fault_then_recovers() {
    let mut circuit = led_circuit();
    let vcc = library::power_rail(origin());
    // Tie the LED anode (driven LOW by the board) to the power rail.
    let anode_wire = Wire::between(vcc.pin_ref("v1"), circuit.parts[1].pin_ref("anode"));
    let anode_wire_id = anode_wire.id.clone();
    circuit.parts.push(vcc);
    circuit.wires.push(anode_wire);
    circuit.set_output(false);
    let led = circuit.led.clone();
    let mut engine = Engine::new(circuit.into_state(1));

    let events = engine.run(2);
    assert_eq!(shorts(&events).len(), 1);
    let props = &engine.state().component(&led).unwrap().props;
    assert_eq!(props.bool(PROP_FAULT), Ok(true));
    assert_eq!(props.bool(PROP_ACTIVE), Ok(false));

    // Removing the offending wire clears the fault; re-adding reports again.
    let removed = engine.state().wire(&anode_wire_id).cloned().unwrap();
    engine.submit(Command::RemoveWire { id: anode_wire_id });
    engine.step();
    let props = &engine.state().component(&led).unwrap().props;
    assert_eq!(props.bool(PROP_FAULT), Ok(false));

    engine.submit(Command::AddWire { wire: removed });
    assert_eq!(shorts(&engine.step().events).len(), 1);
}
