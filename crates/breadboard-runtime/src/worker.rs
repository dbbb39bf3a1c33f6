//! Background worker: a thread that owns its own engine and talks to the
//! host only through [`HostMessage`]/[`WorkerMessage`] channels.
//!
//! Outbound traffic goes over a bounded channel. STATE messages never queue
//! behind one another: the newest state waits in a single slot until the
//! channel has room, replacing any older one still waiting. Every other
//! message is delivered exactly once and in order; while any of them is
//! still waiting for room the worker stops ticking, so a slow host slows
//! the simulation down instead of losing events.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::mpsc::{
    self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError, TrySendError,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use breadboard_core::command_queue::Command;
use breadboard_core::engine::{Engine, EngineConfig};
use breadboard_core::event::{EventKind, SimEvent};
use breadboard_core::sim::SimState;

use crate::host::deliver;
use crate::protocol::{HostMessage, WorkerMessage, is_warning};
use crate::settings::WorkerConfig;

/// How often a stalled worker retries messages the host has not taken yet.
const RETRY_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("could not spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("worker has shut down")]
    Disconnected,
    #[error("timed out waiting for the worker")]
    Timeout,
}

// ===========================================================================
// Host side
// ===========================================================================

/// Creates workers. The runtime falls back to the host loop when spawning
/// fails.
pub trait WorkerFactory {
    fn spawn(&self, config: &WorkerConfig) -> Result<WorkerHandle, RuntimeError>;
}

/// Spawns each worker on a dedicated OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadWorkerFactory;

impl WorkerFactory for ThreadWorkerFactory {
    fn spawn(&self, config: &WorkerConfig) -> Result<WorkerHandle, RuntimeError> {
        let (inbound_tx, inbound_rx) = mpsc::channel::<HostMessage>();
        let (outbound_tx, outbound_rx) = mpsc::sync_channel::<WorkerMessage>(config.channel_capacity.max(1));
        let config = config.clone();
        let thread = thread::Builder::new()
            .name("breadboard-worker".into())
            .spawn(move || WorkerLoop::new(outbound_tx, config).run(inbound_rx))?;
        Ok(WorkerHandle::new(inbound_tx, outbound_rx, Some(thread)))
    }
}

/// The host's end of a worker.
#[derive(Debug)]
pub struct WorkerHandle {
    inbound: Sender<HostMessage>,
    outbound: Receiver<WorkerMessage>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn new(
        inbound: Sender<HostMessage>,
        outbound: Receiver<WorkerMessage>,
        thread: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            inbound,
            outbound,
            thread,
        }
    }

    pub fn post(&self, message: HostMessage) -> Result<(), RuntimeError> {
        self.inbound.send(message).map_err(|_| RuntimeError::Disconnected)
    }

    /// Everything the worker has sent so far, oldest first, and whether the
    /// worker is still connected.
    pub fn drain(&self) -> (Vec<WorkerMessage>, bool) {
        let mut messages = Vec::new();
        loop {
            match self.outbound.try_recv() {
                Ok(m) => messages.push(m),
                Err(TryRecvError::Empty) => return (messages, true),
                Err(TryRecvError::Disconnected) => return (messages, false),
            }
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<WorkerMessage, RuntimeError> {
        self.outbound.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => RuntimeError::Timeout,
            RecvTimeoutError::Disconnected => RuntimeError::Disconnected,
        })
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn terminate(mut self) {
        let _ = self.inbound.send(HostMessage::Stop);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("worker thread panicked during shutdown");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Detach; the worker exits on Stop or when this sender disappears.
        let _ = self.inbound.send(HostMessage::Stop);
    }
}

// ===========================================================================
// Worker side
// ===========================================================================

struct Outbox {
    tx: SyncSender<WorkerMessage>,
    /// Non-STATE messages the channel had no room for, oldest first.
    backlog: VecDeque<WorkerMessage>,
    pending_state: Option<SimState>,
    closed: bool,
}

impl Outbox {
    fn new(tx: SyncSender<WorkerMessage>) -> Self {
        Self {
            tx,
            backlog: VecDeque::new(),
            pending_state: None,
            closed: false,
        }
    }

    /// Send `message`, or queue it behind anything already waiting.
    fn post(&mut self, message: WorkerMessage) {
        if !self.backlog.is_empty() {
            self.backlog.push_back(message);
            return;
        }
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(m)) => {
                log::debug!("host is behind; holding outbound {} message", m.type_name());
                self.backlog.push_back(m);
            }
            Err(TrySendError::Disconnected(_)) => self.closed = true,
        }
    }

    /// Whether undelivered events are waiting. The worker does not tick
    /// until they are gone.
    fn is_backed_up(&self) -> bool {
        !self.backlog.is_empty()
    }

    fn has_pending(&self) -> bool {
        self.is_backed_up() || self.pending_state.is_some()
    }

    /// Replace whatever state is waiting with `state`.
    fn stage_state(&mut self, state: SimState) {
        self.pending_state = Some(state);
    }

    /// Send as much as the channel takes: the backlog in order, then the
    /// pending STATE.
    fn flush(&mut self) {
        while let Some(message) = self.backlog.pop_front() {
            match self.tx.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(m)) => {
                    self.backlog.push_front(m);
                    return;
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.closed = true;
                    return;
                }
            }
        }
        let Some(state) = self.pending_state.take() else {
            return;
        };
        match self.tx.try_send(WorkerMessage::State { state }) {
            Ok(()) => {}
            Err(TrySendError::Full(WorkerMessage::State { state })) => self.pending_state = Some(state),
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => self.closed = true,
        }
    }
}

/// Events collected from the worker engine's own bus.
type EventSink = Rc<RefCell<Vec<SimEvent>>>;

struct WorkerLoop {
    engine: Option<Engine>,
    sink: EventSink,
    playing: bool,
    outbox: Outbox,
    config: WorkerConfig,
    ticks_since_state: u64,
}

enum Flow {
    Continue,
    Exit,
}

impl WorkerLoop {
    fn new(tx: SyncSender<WorkerMessage>, config: WorkerConfig) -> Self {
        Self {
            engine: None,
            sink: Rc::default(),
            playing: false,
            outbox: Outbox::new(tx),
            config,
            ticks_since_state: 0,
        }
    }

    fn run(mut self, inbound: Receiver<HostMessage>) {
        log::debug!("worker started");
        loop {
            // Take everything queued; block only when there is nothing to do.
            let first = if self.ready_to_tick() {
                match inbound.try_recv() {
                    Ok(m) => Some(m),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else if self.outbox.has_pending() {
                match inbound.recv_timeout(RETRY_INTERVAL) {
                    Ok(m) => Some(m),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match inbound.recv() {
                    Ok(m) => Some(m),
                    Err(_) => break,
                }
            };

            let mut exit = false;
            let mut next = first;
            while let Some(message) = next {
                if let Flow::Exit = self.guarded(|w| w.handle(message)) {
                    exit = true;
                    break;
                }
                next = inbound.try_recv().ok();
            }
            if exit {
                break;
            }

            if self.ready_to_tick() {
                let started = Instant::now();
                self.guarded(|w| {
                    w.tick();
                    Flow::Continue
                });
                let interval = self.config.tick_interval();
                if let Some(rest) = interval.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }

            self.outbox.flush();
            if self.outbox.closed {
                break;
            }
        }
        log::debug!("worker stopped");
    }

    fn ready_to_tick(&self) -> bool {
        self.playing && !self.outbox.is_backed_up()
    }

    /// Run `f`, turning a panic into an ERROR message and dropping the
    /// engine. The worker then waits for a fresh INIT.
    fn guarded(&mut self, f: impl FnOnce(&mut Self) -> Flow) -> Flow {
        match catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(flow) => flow,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("worker crashed: {message}");
                self.engine = None;
                self.playing = false;
                self.outbox.pending_state = None;
                self.outbox.post(WorkerMessage::Error { message });
                Flow::Continue
            }
        }
    }

    fn handle(&mut self, message: HostMessage) -> Flow {
        match message {
            HostMessage::Init {
                mut state,
                seed,
                enable_profiler,
            } => {
                state.seed = seed;
                self.playing = state.running;
                let config = EngineConfig {
                    profiler: enable_profiler,
                    ..EngineConfig::default()
                };
                let mut engine = Engine::with_config(state, config);
                for kind in EventKind::ALL {
                    let sink = Rc::clone(&self.sink);
                    engine.subscribe(kind, Box::new(move |e| sink.borrow_mut().push(e.clone())));
                }
                self.engine = Some(engine);
                self.ticks_since_state = 0;
            }
            HostMessage::Play => self.set_playing(true),
            HostMessage::Pause => self.set_playing(false),
            HostMessage::Command { commands } => match self.engine.as_mut() {
                Some(engine) => {
                    let paused = !engine.state().running;
                    for command in commands {
                        deliver(engine, command);
                    }
                    if paused {
                        let state = engine.state().clone();
                        self.outbox.stage_state(state);
                    }
                    self.forward_events();
                }
                None => self.not_initialized("COMMAND"),
            },
            HostMessage::Stop => return Flow::Exit,
        }
        Flow::Continue
    }

    fn set_playing(&mut self, playing: bool) {
        let Some(engine) = self.engine.as_mut() else {
            self.not_initialized(if playing { "PLAY" } else { "PAUSE" });
            return;
        };
        let _ = engine.apply(Command::SetRunning { running: playing });
        self.playing = playing;
        // Supersedes any paused STATE still waiting in the slot.
        let state = engine.state().clone();
        self.outbox.stage_state(state);
    }

    fn not_initialized(&mut self, what: &str) {
        log::warn!("worker got {what} before INIT");
        self.outbox.post(WorkerMessage::Error {
            message: format!("{what} received before INIT"),
        });
    }

    fn tick(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            self.playing = false;
            return;
        };
        engine.step();
        self.ticks_since_state += 1;

        // A scheduled SetRunning(false) stops the loop like PAUSE does.
        let stopped = !engine.state().running;
        if stopped || self.ticks_since_state >= self.config.state_every.max(1) {
            let state = engine.state().clone();
            self.outbox.stage_state(state);
            self.ticks_since_state = 0;
        }
        if stopped {
            self.playing = false;
        }
        self.forward_events();
    }

    fn forward_events(&mut self) {
        let events = std::mem::take(&mut *self.sink.borrow_mut());
        let (warnings, others): (Vec<_>, Vec<_>) = events.into_iter().partition(is_warning);
        for w in warnings {
            self.outbox.post(WorkerMessage::Warning(w));
        }
        if !others.is_empty() {
            self.outbox.post(WorkerMessage::Events { events: others });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
