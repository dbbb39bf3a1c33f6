//! Host-thread execution: one tick per animation frame, on the caller's
//! thread.

use breadboard_core::command_queue::{Command, ScheduledCommand};
use breadboard_core::engine::{Engine, EngineConfig, TickReport};
use breadboard_core::event::{EventBus, SimEvent};
use breadboard_core::sim::SimState;

/// Hand a command to an engine. While the engine is paused, commands that
/// are already due apply at once so edits show up without ticking; the rest
/// wait in the queue.
pub(crate) fn deliver(engine: &mut Engine, command: ScheduledCommand) {
    let due = command.at_tick.is_none_or(|t| t <= engine.tick());
    if engine.state().running || !due {
        engine.submit(command);
        return;
    }
    if let Err(err) = engine.apply(command.command) {
        log::warn!("rejected command: {err}");
        let warning = SimEvent::warning(format!("rejected command: {err}"), engine.tick());
        engine.event_bus_mut().publish(&warning);
    }
}

#[derive(Debug)]
pub struct HostLoop {
    engine: Engine,
}

impl HostLoop {
    pub fn new(state: SimState, config: EngineConfig, bus: EventBus) -> Self {
        Self {
            engine: Engine::with_event_bus(state, config, bus),
        }
    }

    /// Called once per animation frame. Runs a tick if the simulation is
    /// running; otherwise returns at once.
    pub fn frame(&mut self) -> Option<TickReport> {
        if !self.engine.state().running {
            return None;
        }
        Some(self.engine.step())
    }

    pub fn set_running(&mut self, running: bool) {
        // SetRunning cannot be rejected.
        let _ = self.engine.apply(Command::SetRunning { running });
    }

    pub fn submit(&mut self, command: ScheduledCommand) {
        deliver(&mut self.engine, command);
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn into_parts(self) -> (SimState, EventBus, Vec<ScheduledCommand>) {
        self.engine.into_parts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadboard_core::library::PROP_ACTIVE;
    use breadboard_core::test_utils::*;

    fn led_loop() -> (HostLoop, breadboard_core::id::ComponentId, breadboard_core::id::ComponentId) {
        let circuit = led_circuit();
        let (board, led) = (circuit.board.clone(), circuit.led.clone());
        let host = HostLoop::new(circuit.into_state(1), EngineConfig::default(), EventBus::new());
        (host, board, led)
    }

    #[test]
    fn paused_loop_does_not_tick() {
        let (mut host, _, _) = led_loop();
        assert!(host.frame().is_none());
        assert_eq!(host.engine().tick(), 0);
        host.set_running(true);
        assert_eq!(host.frame().map(|r| r.tick), Some(0));
        assert_eq!(host.engine().tick(), 1);
    }

    #[test]
    fn paused_edits_apply_immediately() {
        let (mut host, board, _) = led_loop();
        host.submit(
            Command::SetPinOutput {
                board: board.clone(),
                pin: LED_PIN.into(),
                level: Some(true),
            }
            .into(),
        );
        assert!(host.engine().command_queue().is_empty());
        let props = &host.engine().state().component(&board).unwrap().props;
        assert!(props.bool("out.GPIO2").unwrap());
    }

    #[test]
    fn running_edits_wait_for_the_tick() {
        let (mut host, board, led) = led_loop();
        host.set_running(true);
        host.submit(
            Command::SetPinOutput {
                board,
                pin: LED_PIN.into(),
                level: Some(true),
            }
            .into(),
        );
        assert_eq!(host.engine().command_queue().pending_count(), 1);
        host.frame();
        let props = &host.engine().state().component(&led).unwrap().props;
        assert!(props.bool(PROP_ACTIVE).unwrap());
    }

    #[test]
    fn future_commands_wait_even_when_paused() {
        let (mut host, _, _) = led_loop();
        host.submit(ScheduledCommand::at(5, Command::SetRunning { running: true }));
        assert_eq!(host.engine().command_queue().pending_count(), 1);
        assert!(!host.engine().state().running);
    }
}
