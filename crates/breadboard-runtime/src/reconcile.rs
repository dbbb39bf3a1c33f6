//! Applying a worker's STATE message to the host's copy of the state.

use breadboard_core::id::ComponentId;
use breadboard_core::sim::SimState;

/// What [`reconcile`] did to the local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Same topology; only these components' props or placement changed.
    Patched { changed: Vec<ComponentId> },
    /// Topology differed; the component and wire lists were replaced.
    Replaced,
}

/// Bring `local` up to date with `incoming`.
///
/// Topology is compared by structural version, so a STATE that only moved
/// props costs one pass over the components and no list rebuild.
pub fn reconcile(local: &mut SimState, incoming: SimState) -> Reconciled {
    local.running = incoming.running;
    local.tick = incoming.tick;
    local.elapsed = incoming.elapsed;
    local.time_scale = incoming.time_scale;
    local.seed = incoming.seed;
    local.schema_version = incoming.schema_version;

    let same_topology = local.structural_version == incoming.structural_version
        && local.components.len() == incoming.components.len()
        && local.wires.len() == incoming.wires.len();
    if !same_topology {
        log::debug!(
            "structural version {} -> {}, replacing lists",
            local.structural_version,
            incoming.structural_version
        );
        local.components = incoming.components;
        local.wires = incoming.wires;
        local.structural_version = incoming.structural_version;
        return Reconciled::Replaced;
    }

    let mut changed = Vec::new();
    for (mine, theirs) in local.components.iter_mut().zip(incoming.components) {
        let mut touched = false;
        if mine.props != theirs.props {
            mine.props = theirs.props;
            touched = true;
        }
        if mine.position != theirs.position || mine.rotation != theirs.rotation {
            mine.position = theirs.position;
            mine.rotation = theirs.rotation;
            touched = true;
        }
        if touched {
            changed.push(mine.id.clone());
        }
    }
    Reconciled::Patched { changed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadboard_core::command_queue::Command;
    use breadboard_core::component::Position;
    use breadboard_core::engine::Engine;
    use breadboard_core::library;
    use breadboard_core::test_utils::*;

    #[test]
    fn prop_changes_are_patched() {
        let mut circuit = led_circuit();
        let led = circuit.led.clone();
        let mut local = led_circuit_state(&circuit);
        circuit.set_output(true);
        let mut engine = Engine::new(led_circuit_state(&circuit));
        engine.step();

        let before: Vec<_> = local.components.iter().map(|c| c.id.clone()).collect();
        let outcome = reconcile(&mut local, engine.state().clone());

        match outcome {
            Reconciled::Patched { changed } => assert!(changed.contains(&led)),
            other => panic!("expected patch, got {other:?}"),
        }
        let after: Vec<_> = local.components.iter().map(|c| c.id.clone()).collect();
        assert_eq!(before, after);
        assert_eq!(local, *engine.state());
    }

    #[test]
    fn unchanged_state_patches_nothing() {
        let state = led_circuit().into_state(1);
        let mut local = state.clone();
        assert_eq!(reconcile(&mut local, state), Reconciled::Patched { changed: vec![] });
    }

    #[test]
    fn moves_are_patched() {
        let circuit = led_circuit();
        let led = circuit.led.clone();
        let state = circuit.into_state(1);
        let mut local = state.clone();
        let mut engine = Engine::new(state);
        engine
            .apply(Command::MoveComponent {
                id: led.clone(),
                position: Position::new(3.0, 4.0),
                rotation: 90,
            })
            .unwrap();
        assert_eq!(
            reconcile(&mut local, engine.state().clone()),
            Reconciled::Patched { changed: vec![led] }
        );
        assert_eq!(local, *engine.state());
    }

    #[test]
    fn structural_edit_replaces_lists() {
        let circuit = led_circuit();
        let resistor = circuit.resistor.clone();
        let state = circuit.into_state(1);
        let mut local = state.clone();
        let mut engine = Engine::new(state);
        engine.apply(Command::RemoveComponent { id: resistor }).unwrap();
        engine
            .apply(Command::AddComponent {
                component: library::buzzer(origin()),
            })
            .unwrap();

        assert_eq!(reconcile(&mut local, engine.state().clone()), Reconciled::Replaced);
        assert_eq!(local, *engine.state());
    }

    fn led_circuit_state(circuit: &LedCircuit) -> SimState {
        state_of(1, circuit.parts.clone(), circuit.wires.clone())
    }
}
