//! The simulation engine: owns a [`SimState`] and advances it tick by tick.
//!
//! # Tick pipeline
//!
//! Each call to [`Engine::step`] runs:
//!
//! 1. **Commands** -- apply every queued command due at this tick
//! 2. **Nets** -- rebuild nets if the structural version changed
//! 3. **Resolve** -- supply pass, input sampling, full resolution, short clamp
//! 4. **Evaluate** -- update LEDs, buzzers, servos and board inputs
//! 5. **Publish** -- deliver this tick's events to the bus
//!
//! then increments the tick counter and advances elapsed time by one tick
//! length times the time scale.
//!
//! `step` always runs a tick; gating on [`SimState::running`] is left to the
//! runtime driving the engine.

use crate::behavior::{self, TickContext};
use crate::command_queue::{Command, CommandQueue, ScheduledCommand};
use crate::component::{Component, ComponentKind};
use crate::event::{EventBus, EventKind, Handler, SimEvent};
use crate::fixed::{Fixed64, Ticks, clamp_unit, tick_seconds};
use crate::id::{ComponentId, PinId, PinRef, SubscriptionId};
use crate::library::{self, PROP_PRESSED, PROP_STIMULUS, PROP_TARGET, PROP_WIPER};
use crate::net::{NetCache, NetMap};
use crate::profiling::{PhaseClock, TickProfile};
use crate::short::ShortCircuitDetector;
use crate::signal::{self, Level, NetLevel};
use crate::sim::{EditError, SimState};

/// Largest accepted time scale. `SetTimeScale` clamps into `[0, MAX_TIME_SCALE]`.
pub const MAX_TIME_SCALE: u32 = 100;

// ---------------------------------------------------------------------------
// Configuration & results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Record per-phase timings for every tick.
    pub profiler: bool,
    /// Executed commands to keep for debugging. 0 = none.
    pub command_history: usize,
}

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// The tick that ran (the counter before it was incremented).
    pub tick: Ticks,
    pub events: Vec<SimEvent>,
    /// Commands that failed validation and were skipped.
    pub rejected: Vec<EditError>,
    pub profile: Option<TickProfile>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Engine {
    state: SimState,
    nets: NetCache,
    bus: EventBus,
    commands: CommandQueue,
    shorts: ShortCircuitDetector,
    config: EngineConfig,
    /// Net levels from the most recent tick, indexed by net id.
    last_levels: Vec<NetLevel>,
    last_profile: Option<TickProfile>,
}

impl Engine {
    pub fn new(state: SimState) -> Self {
        Self::with_config(state, EngineConfig::default())
    }

    pub fn with_config(state: SimState, config: EngineConfig) -> Self {
        Self::with_event_bus(state, config, EventBus::new())
    }

    /// Build an engine around an existing bus, keeping its subscribers.
    pub fn with_event_bus(state: SimState, config: EngineConfig, bus: EventBus) -> Self {
        Self {
            state,
            nets: NetCache::new(),
            bus,
            commands: CommandQueue::with_max_history(config.command_history),
            shorts: ShortCircuitDetector::new(),
            config,
            last_levels: Vec::new(),
            last_profile: None,
        }
    }

    /// Tear down, returning the state, the bus and any commands not yet run.
    pub fn into_parts(mut self) -> (SimState, EventBus, Vec<ScheduledCommand>) {
        let pending = self.commands.take_pending();
        (self.state, self.bus, pending)
    }

    // -- Accessors --

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn tick(&self) -> Ticks {
        self.state.tick
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_profiler(&mut self, enabled: bool) {
        self.config.profiler = enabled;
    }

    pub fn last_profile(&self) -> Option<&TickProfile> {
        self.last_profile.as_ref()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn event_bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn subscribe(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn command_queue(&self) -> &CommandQueue {
        &self.commands
    }

    /// Nets for the current topology, rebuilding if needed.
    pub fn nets(&mut self) -> &NetMap {
        self.nets
            .get(self.state.structural_version, &self.state.components, &self.state.wires)
    }

    /// Number of net rebuilds so far.
    pub fn net_rebuilds(&self) -> u64 {
        self.nets.rebuilds()
    }

    /// Resolved level of the net holding `pin` as of the last tick.
    pub fn level_at(&self, pin: &PinRef) -> Option<NetLevel> {
        let net = self.nets.current().net_of(pin)?;
        self.last_levels.get(net.0 as usize).copied()
    }

    /// Hash of every component's props plus the clock.
    pub fn state_hash(&self) -> u64 {
        let mut h = crate::sim::StateHash::new();
        h.write_u64(self.state.props_hash());
        h.write_u64(self.state.tick);
        h.write_fixed64(self.state.elapsed);
        h.finish()
    }

    // -- Input --

    /// Queue a command for its scheduled tick (or the next one).
    pub fn submit(&mut self, command: impl Into<ScheduledCommand>) {
        self.commands.push(command);
    }

    /// Apply a command now, between ticks. Resulting events are published
    /// immediately.
    pub fn apply(&mut self, command: Command) -> Result<(), EditError> {
        let mut events = Vec::new();
        self.apply_command(command, &mut events)?;
        self.bus.publish_all(&events);
        Ok(())
    }

    /// Replace the whole state. Nets rebuild and shorts re-arm on the next tick.
    pub fn replace_state(&mut self, state: SimState) {
        self.state = state;
        self.nets.invalidate();
        self.shorts.reset();
        self.last_levels.clear();
    }

    // -- Advance --

    /// Run one tick.
    pub fn step(&mut self) -> TickReport {
        let tick = self.state.tick;
        let mut clock = PhaseClock::new(self.config.profiler);
        let mut events = Vec::new();
        let mut rejected = Vec::new();

        // Phase 1: commands due at this tick.
        for command in self.commands.drain_due(tick) {
            if let Err(err) = self.apply_command(command, &mut events) {
                log::warn!("tick {tick}: rejected command: {err}");
                events.push(SimEvent::warning(format!("rejected command: {err}"), tick));
                rejected.push(err);
            }
        }
        let commands_time = clock.lap();

        // Phase 2: nets.
        let map = self
            .nets
            .get(self.state.structural_version, &self.state.components, &self.state.wires);
        let nets_time = clock.lap();

        // Phase 3: resolution.
        let ctx = TickContext {
            tick,
            seed: self.state.seed,
            time_scale: self.state.time_scale,
        };
        let components = &mut self.state.components;
        events.extend(behavior::check_switches(components, tick));
        let mut drive = behavior::base_drives(components);
        let supply = signal::resolve(map, &drive);
        events.extend(behavior::sample_inputs(components, &supply, ctx));
        behavior::add_input_drives(components, &mut drive);
        let mut resolution = signal::resolve(map, &drive);
        events.extend(self.shorts.scan(&mut resolution, tick));
        let resolve_time = clock.lap();

        // Phase 4: evaluation.
        events.extend(behavior::evaluate(components, &resolution, ctx));
        self.last_levels = resolution.iter().map(|(_, s)| s.level).collect();
        let evaluate_time = clock.lap();

        // Phase 5: publish.
        self.bus.publish_all(&events);
        let publish_time = clock.lap();

        self.state.tick += 1;
        // Saturates: a state loaded with an out-of-range scale must not panic.
        let advance = tick_seconds().saturating_mul(self.state.time_scale);
        self.state.elapsed = self.state.elapsed.saturating_add(advance);

        let profile = clock.total().map(|total| TickProfile {
            commands: commands_time,
            nets: nets_time,
            resolve: resolve_time,
            evaluate: evaluate_time,
            publish: publish_time,
            total,
            tick,
        });
        self.last_profile = profile.clone();

        TickReport {
            tick,
            events,
            rejected,
            profile,
        }
    }

    /// Run `n` ticks, returning every event in order.
    pub fn run(&mut self, n: u64) -> Vec<SimEvent> {
        (0..n).flat_map(|_| self.step().events).collect()
    }

    // -----------------------------------------------------------------------
    // Command application
    // -----------------------------------------------------------------------

    fn apply_command(&mut self, command: Command, events: &mut Vec<SimEvent>) -> Result<(), EditError> {
        let tick = self.state.tick;
        match command {
            Command::AddComponent { component } => self.state.add_component(component),
            Command::RemoveComponent { id } => self.state.remove_component(&id).map(drop),
            Command::MoveComponent { id, position, rotation } => {
                self.state.move_component(&id, position, rotation)
            }
            Command::AddWire { wire } => self.state.add_wire(wire),
            Command::RemoveWire { id } => self.state.remove_wire(&id).map(drop),
            Command::SetRunning { running } => {
                self.state.running = running;
                Ok(())
            }
            Command::SetTimeScale { scale } => {
                self.state.time_scale = scale.clamp(Fixed64::ZERO, Fixed64::from_num(MAX_TIME_SCALE));
                Ok(())
            }
            Command::SetPinOutput { board, pin, level } => {
                let c = self.board_pin(&board, &pin)?;
                let out_key = library::board_output_key(pin.as_str());
                c.props.remove(&library::board_pwm_key(pin.as_str()));
                let changed = match level {
                    Some(high) => c.props.set_bool(out_key, high),
                    None => c.props.remove(&out_key),
                };
                if changed {
                    events.push(SimEvent::OutputPinSet {
                        component: board,
                        pin,
                        level: level.map(Level::from_bool),
                        tick,
                    });
                }
                Ok(())
            }
            Command::SetPwmOutput { board, pin, duty } => {
                let c = self.board_pin(&board, &pin)?;
                let pwm_key = library::board_pwm_key(pin.as_str());
                c.props.remove(&library::board_output_key(pin.as_str()));
                match duty {
                    Some(d) => c.props.set_number(pwm_key, clamp_unit(d)),
                    None => c.props.remove(&pwm_key),
                };
                Ok(())
            }
            Command::SetButton { id, pressed } => {
                let c = self.component_of(&id, &[ComponentKind::Button], "button")?;
                c.props.set_bool(PROP_PRESSED, pressed);
                Ok(())
            }
            Command::SetPotentiometer { id, wiper } => {
                let c = self.component_of(&id, &[ComponentKind::Potentiometer], "potentiometer")?;
                c.props.set_number(PROP_WIPER, clamp_unit(wiper));
                Ok(())
            }
            Command::InjectSensor { id, value } => {
                let sensors = [
                    ComponentKind::MotionSensor,
                    ComponentKind::DistanceSensor,
                    ComponentKind::TemperatureSensor,
                ];
                let c = self.component_of(&id, &sensors, "sensor")?;
                match value {
                    Some(v) => c.props.set_number(PROP_STIMULUS, v),
                    None => c.props.remove(PROP_STIMULUS),
                };
                Ok(())
            }
            Command::SetServoTarget { id, degrees } => {
                let c = self.component_of(&id, &[ComponentKind::Servo], "servo")?;
                let range = Fixed64::from_num(behavior::SERVO_RANGE);
                c.props.set_number(PROP_TARGET, degrees.clamp(Fixed64::ZERO, range));
                Ok(())
            }
        }
    }

    fn component_of(
        &mut self,
        id: &ComponentId,
        kinds: &[ComponentKind],
        expected: &'static str,
    ) -> Result<&mut Component, EditError> {
        let c = self
            .state
            .component_mut(id)
            .ok_or_else(|| EditError::ComponentNotFound(id.clone()))?;
        if !kinds.contains(&c.kind) {
            return Err(EditError::WrongKind {
                component: id.clone(),
                expected,
                actual: c.kind.id_prefix(),
            });
        }
        Ok(c)
    }

    /// The board owning `pin`, which must be one of its GPIOs.
    fn board_pin(&mut self, board: &ComponentId, pin: &PinId) -> Result<&mut Component, EditError> {
        let c = self.component_of(board, &[ComponentKind::Board], "board")?;
        if c.pins.iter().any(|p| &p.id == pin && p.gpio.is_some()) {
            Ok(c)
        } else {
            Err(EditError::PinNotFound(PinRef::new(board, pin)))
        }
    }
}
