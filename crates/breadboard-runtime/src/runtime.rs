//! The dual-mode runtime: one simulation, driven either by the host loop or
//! by a background worker, switchable while running.
//!
//! The event bus always belongs to the [`Simulation`]. In host mode it lives
//! inside the engine; in worker mode the worker's events arrive as messages
//! and are republished here, so subscribers never notice a mode switch.

use std::time::Instant;

use breadboard_core::command_queue::ScheduledCommand;
use breadboard_core::engine::{EngineConfig, TickReport};
use breadboard_core::event::{EventBus, EventKind, Handler, SimEvent};
use breadboard_core::fixed::Ticks;
use breadboard_core::id::SubscriptionId;
use breadboard_core::sim::SimState;

use crate::host::HostLoop;
use crate::protocol::{HostMessage, WorkerMessage};
use crate::reconcile::{Reconciled, reconcile};
use crate::settings::{RuntimeMode, Settings};
use crate::worker::{RuntimeError, ThreadWorkerFactory, WorkerFactory, WorkerHandle};

struct WorkerBackend {
    handle: WorkerHandle,
    /// The host's copy, kept current from STATE messages.
    mirror: SimState,
    bus: EventBus,
}

enum Backend {
    Host(HostLoop),
    Worker(WorkerBackend),
}

/// What one [`Simulation::frame`] call did.
#[derive(Debug, Default)]
pub struct Frame {
    /// Host mode: the tick that ran, if the simulation is running.
    pub report: Option<TickReport>,
    /// Worker mode: how the newest STATE was applied, if one arrived.
    pub reconciled: Option<Reconciled>,
    /// ERROR messages received from the worker.
    pub errors: Vec<String>,
}

pub struct Simulation {
    backend: Backend,
    settings: Settings,
    factory: Box<dyn WorkerFactory>,
}

impl Simulation {
    /// Start with the mode chosen in `settings`, spawning workers on threads.
    pub fn start(state: SimState, settings: &Settings) -> Self {
        Self::start_with_factory(state, settings, Box::new(ThreadWorkerFactory))
    }

    /// Start with a custom worker factory. If the worker cannot be spawned,
    /// the simulation runs on the host loop instead.
    pub fn start_with_factory(
        state: SimState,
        settings: &Settings,
        factory: Box<dyn WorkerFactory>,
    ) -> Self {
        let mut sim = Self {
            backend: Backend::Host(HostLoop::new(
                SimState::default(),
                EngineConfig::default(),
                EventBus::new(),
            )),
            settings: settings.clone(),
            factory,
        };
        sim.backend = match settings.mode {
            RuntimeMode::HostLoop => Backend::Host(sim.host_backend(state, EventBus::new())),
            RuntimeMode::Worker => sim.worker_or_host(state, EventBus::new(), Vec::new()),
        };
        sim
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            profiler: self.settings.profiler,
            ..EngineConfig::default()
        }
    }

    fn host_backend(&self, state: SimState, bus: EventBus) -> HostLoop {
        HostLoop::new(state, self.engine_config(), bus)
    }

    /// Spawn and initialize a worker. Falls back to the host loop on any
    /// failure; the state, bus and pending commands carry over either way.
    fn worker_or_host(
        &self,
        state: SimState,
        bus: EventBus,
        pending: Vec<ScheduledCommand>,
    ) -> Backend {
        match self.spawn_worker(&state, pending.clone()) {
            Ok(handle) => Backend::Worker(WorkerBackend {
                handle,
                mirror: state,
                bus,
            }),
            Err(err) => {
                log::warn!("worker unavailable ({err}); running on the host loop");
                let mut host = self.host_backend(state, bus);
                for command in pending {
                    host.submit(command);
                }
                Backend::Host(host)
            }
        }
    }

    fn spawn_worker(
        &self,
        state: &SimState,
        pending: Vec<ScheduledCommand>,
    ) -> Result<WorkerHandle, RuntimeError> {
        let handle = self.factory.spawn(&self.settings.worker)?;
        handle.post(HostMessage::Init {
            state: state.clone(),
            seed: state.seed,
            enable_profiler: self.settings.profiler,
        })?;
        if !pending.is_empty() {
            handle.post(HostMessage::Command { commands: pending })?;
        }
        Ok(handle)
    }

    /// Move the backend out, leaving an empty host loop in its place until
    /// the caller installs a replacement.
    fn take_backend(&mut self) -> Backend {
        let empty = Backend::Host(HostLoop::new(
            SimState::default(),
            EngineConfig::default(),
            EventBus::new(),
        ));
        std::mem::replace(&mut self.backend, empty)
    }

    // -- Accessors --

    pub fn mode(&self) -> RuntimeMode {
        match &self.backend {
            Backend::Host(_) => RuntimeMode::HostLoop,
            Backend::Worker(_) => RuntimeMode::Worker,
        }
    }

    /// The current state: the engine's own in host mode, the last reconciled
    /// copy in worker mode.
    pub fn state(&self) -> &SimState {
        match &self.backend {
            Backend::Host(host) => host.engine().state(),
            Backend::Worker(w) => &w.mirror,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn bus_mut(&mut self) -> &mut EventBus {
        match &mut self.backend {
            Backend::Host(host) => host.engine_mut().event_bus_mut(),
            Backend::Worker(w) => &mut w.bus,
        }
    }

    pub fn subscribe(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        self.bus_mut().subscribe(kind, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus_mut().unsubscribe(id)
    }

    // -- Control --

    pub fn play(&mut self) {
        self.set_running(true);
    }

    pub fn pause(&mut self) {
        self.set_running(false);
    }

    fn set_running(&mut self, running: bool) {
        match &mut self.backend {
            Backend::Host(host) => host.set_running(running),
            Backend::Worker(w) => {
                w.mirror.running = running;
                let message = if running { HostMessage::Play } else { HostMessage::Pause };
                if let Err(err) = w.handle.post(message) {
                    log::warn!("could not reach worker: {err}");
                }
            }
        }
    }

    /// Send an edit or stimulus. Unscheduled commands apply on the next tick,
    /// or at once while paused.
    pub fn submit(&mut self, command: impl Into<ScheduledCommand>) {
        let command = command.into();
        match &mut self.backend {
            Backend::Host(host) => host.submit(command),
            Backend::Worker(w) => {
                if let Err(err) = w.handle.post(HostMessage::Command {
                    commands: vec![command],
                }) {
                    log::warn!("could not reach worker: {err}");
                }
            }
        }
    }

    /// Advance by one animation frame.
    ///
    /// Host mode runs at most one tick. Worker mode drains the worker's
    /// messages, republishes its events and applies only the newest STATE.
    /// A worker that has gone away, or that reported an ERROR (after which
    /// it holds no engine), is replaced by the host loop, resuming from the
    /// last state received.
    pub fn frame(&mut self) -> Frame {
        let mut frame = Frame::default();
        let lost_worker = match &mut self.backend {
            Backend::Host(host) => {
                frame.report = host.frame();
                None
            }
            Backend::Worker(w) => {
                let (messages, alive) = w.handle.drain();
                let mut newest = None;
                for message in messages {
                    match message {
                        WorkerMessage::State { state } => newest = Some(state),
                        other => dispatch(&mut w.bus, other, w.mirror.tick, &mut frame.errors),
                    }
                }
                if let Some(state) = newest {
                    frame.reconciled = Some(reconcile(&mut w.mirror, state));
                }
                if !alive {
                    Some("worker disconnected")
                } else if !frame.errors.is_empty() {
                    Some("worker failed")
                } else {
                    None
                }
            }
        };
        if let Some(reason) = lost_worker {
            log::error!("{reason}; resuming on the host loop");
            self.replace_worker_with_host(None);
        }
        frame
    }

    /// Switch execution mode, keeping every component and wire. Returns the
    /// mode actually in effect, which stays on the host loop if a worker
    /// could not be started.
    pub fn switch_mode(&mut self, mode: RuntimeMode) -> RuntimeMode {
        if mode == self.mode() {
            return mode;
        }
        match mode {
            RuntimeMode::Worker => {
                self.backend = match self.take_backend() {
                    Backend::Host(host) => {
                        let (state, bus, pending) = host.into_parts();
                        self.worker_or_host(state, bus, pending)
                    }
                    worker => worker,
                };
            }
            RuntimeMode::HostLoop => self.stop_worker(),
        }
        self.mode()
    }

    /// Pause the worker, wait (bounded) for its final STATE, then continue
    /// on the host loop with the running flag restored.
    fn stop_worker(&mut self) {
        let mut errors = Vec::new();
        let mut final_state = None;
        if let Backend::Worker(w) = &mut self.backend {
            let was_running = w.mirror.running;
            let deadline = Instant::now() + self.settings.worker.flush_timeout();
            if w.handle.post(HostMessage::Pause).is_ok() {
                loop {
                    let left = deadline.saturating_duration_since(Instant::now());
                    match w.handle.recv_timeout(left) {
                        Ok(WorkerMessage::State { mut state }) if !state.running => {
                            state.running = was_running;
                            final_state = Some(state);
                            break;
                        }
                        Ok(WorkerMessage::State { state }) => {
                            reconcile(&mut w.mirror, state);
                        }
                        Ok(other) => dispatch(&mut w.bus, other, w.mirror.tick, &mut errors),
                        Err(err) => {
                            log::warn!("no final state from worker ({err}); using last known state");
                            break;
                        }
                    }
                }
                // Anything staged after the pause (e.g. a paused edit) is newer.
                let (rest, _) = w.handle.drain();
                for message in rest {
                    match message {
                        WorkerMessage::State { mut state } => {
                            state.running = was_running;
                            final_state = Some(state);
                        }
                        other => dispatch(&mut w.bus, other, w.mirror.tick, &mut errors),
                    }
                }
            }
            if final_state.is_none() {
                w.mirror.running = was_running;
            }
        }
        self.replace_worker_with_host(final_state);
    }

    fn replace_worker_with_host(&mut self, final_state: Option<SimState>) {
        self.backend = match self.take_backend() {
            Backend::Worker(WorkerBackend {
                handle,
                mut mirror,
                bus,
            }) => {
                if let Some(state) = final_state {
                    reconcile(&mut mirror, state);
                }
                handle.terminate();
                Backend::Host(self.host_backend(mirror, bus))
            }
            host => host,
        };
    }

    /// Shut down and return the final state.
    pub fn dispose(mut self) -> SimState {
        if self.mode() == RuntimeMode::Worker {
            self.stop_worker();
        }
        match self.take_backend() {
            Backend::Host(host) => host.into_parts().0,
            Backend::Worker(w) => w.mirror,
        }
    }
}

/// Republish a non-STATE worker message on the host bus.
fn dispatch(bus: &mut EventBus, message: WorkerMessage, tick: Ticks, errors: &mut Vec<String>) {
    match message {
        WorkerMessage::Warning(event) => bus.publish(&event),
        WorkerMessage::Events { events } => bus.publish_all(&events),
        WorkerMessage::Error { message } => {
            log::error!("worker reported: {message}");
            bus.publish(&SimEvent::Warning {
                component: None,
                message: format!("worker error: {message}"),
                tick,
            });
            errors.push(message);
        }
        WorkerMessage::State { .. } => {}
    }
}
