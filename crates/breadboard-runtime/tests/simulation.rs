//! Runtime behavior across both execution modes.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use breadboard_core::command_queue::{Command, ScheduledCommand};
use breadboard_core::event::{EventKind, SimEvent};
use breadboard_core::library::PROP_ACTIVE;
use breadboard_core::sim::SimState;
use breadboard_core::test_utils::*;
use breadboard_runtime::protocol::{HostMessage, WorkerMessage};
use breadboard_runtime::worker::{RuntimeError, WorkerFactory, WorkerHandle};
use breadboard_runtime::{RuntimeMode, Settings, Simulation, WorkerConfig};

const WAIT: Duration = Duration::from_secs(5);

fn worker_settings() -> Settings {
    Settings {
        mode: RuntimeMode::Worker,
        profiler: false,
        worker: WorkerConfig {
            tick_interval_ms: 0,
            ..WorkerConfig::default()
        },
    }
}

/// Call `frame` until `done` holds for the simulation's state.
fn frame_until(sim: &mut Simulation, done: impl Fn(&SimState) -> bool) {
    let deadline = Instant::now() + WAIT;
    while !done(sim.state()) {
        assert!(Instant::now() < deadline, "timed out at tick {}", sim.state().tick);
        sim.frame();
        std::thread::sleep(Duration::from_millis(1));
    }
}

struct NoThreads;

impl WorkerFactory for NoThreads {
    fn spawn(&self, _: &WorkerConfig) -> Result<WorkerHandle, RuntimeError> {
        Err(RuntimeError::Spawn(std::io::Error::other("threads disabled")))
    }
}

/// A worker whose engine dies as soon as it is asked to play.
struct CrashOnPlay;

impl WorkerFactory for CrashOnPlay {
    fn spawn(&self, _: &WorkerConfig) -> Result<WorkerHandle, RuntimeError> {
        let (inbound_tx, inbound_rx) = mpsc::channel::<HostMessage>();
        let (outbound_tx, outbound_rx) = mpsc::sync_channel(8);
        let thread = std::thread::spawn(move || {
            for message in inbound_rx {
                match message {
                    HostMessage::Play => {
                        let _ = outbound_tx.send(WorkerMessage::Error {
                            message: "engine crashed".into(),
                        });
                    }
                    HostMessage::Stop => break,
                    _ => {}
                }
            }
        });
        Ok(WorkerHandle::new(inbound_tx, outbound_rx, Some(thread)))
    }
}

#[test]
fn default_settings_run_on_host() {
    let sim = Simulation::start(led_circuit().into_state(1), &Settings::default());
    assert_eq!(sim.mode(), RuntimeMode::HostLoop);
}

#[test]
fn spawn_failure_falls_back_to_host() {
    let mut sim =
        Simulation::start_with_factory(led_circuit().into_state(1), &worker_settings(), Box::new(NoThreads));
    assert_eq!(sim.mode(), RuntimeMode::HostLoop);
    sim.play();
    assert!(sim.frame().report.is_some());
    assert_eq!(sim.switch_mode(RuntimeMode::Worker), RuntimeMode::HostLoop);
}

#[test]
fn host_frames_only_tick_while_running() {
    let mut sim = Simulation::start(led_circuit().into_state(1), &Settings::default());
    assert!(sim.frame().report.is_none());
    sim.play();
    sim.frame();
    sim.frame();
    assert_eq!(sim.state().tick, 2);
    sim.pause();
    assert!(sim.frame().report.is_none());
}

#[test]
fn worker_lights_led() {
    let circuit = led_circuit();
    let (board, led) = (circuit.board.clone(), circuit.led.clone());
    let mut sim = Simulation::start(circuit.into_state(1), &worker_settings());
    assert_eq!(sim.mode(), RuntimeMode::Worker);

    sim.submit(Command::SetPinOutput {
        board,
        pin: LED_PIN.into(),
        level: Some(true),
    });
    sim.play();
    frame_until(&mut sim, |s| {
        s.component(&led).is_some_and(|c| c.props.bool(PROP_ACTIVE) == Ok(true))
    });
    sim.dispose();
}

#[test]
fn worker_events_reach_host_subscribers() {
    let circuit = led_circuit();
    let board = circuit.board.clone();
    let mut sim = Simulation::start(circuit.into_state(1), &worker_settings());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    sim.subscribe(
        EventKind::OutputPinSet,
        Box::new(move |e| sink.borrow_mut().push(e.clone())),
    );

    sim.submit(Command::SetPinOutput {
        board,
        pin: LED_PIN.into(),
        level: Some(true),
    });
    let deadline = Instant::now() + WAIT;
    while seen.borrow().is_empty() {
        assert!(Instant::now() < deadline, "no event arrived");
        sim.frame();
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(matches!(seen.borrow()[0], SimEvent::OutputPinSet { .. }));
    sim.dispose();
}

#[test]
fn switching_modes_keeps_ids_and_subscribers() {
    let circuit = led_circuit();
    let board = circuit.board.clone();
    let mut sim = Simulation::start(circuit.into_state(1), &Settings::default());
    let count = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&count);
    sim.subscribe(EventKind::OutputPinSet, Box::new(move |_| *sink.borrow_mut() += 1));

    sim.play();
    sim.frame();
    let ids_before = {
        let (c, w) = sim.state().structural_ids();
        (
            c.into_iter().cloned().collect::<Vec<_>>(),
            w.into_iter().cloned().collect::<Vec<_>>(),
        )
    };

    assert_eq!(sim.switch_mode(RuntimeMode::Worker), RuntimeMode::Worker);
    assert_eq!(sim.switch_mode(RuntimeMode::HostLoop), RuntimeMode::HostLoop);
    assert!(sim.state().running, "running flag survives the round trip");

    let (c, w) = sim.state().structural_ids();
    assert_eq!(c.into_iter().cloned().collect::<Vec<_>>(), ids_before.0);
    assert_eq!(w.into_iter().cloned().collect::<Vec<_>>(), ids_before.1);

    // Delivery resumes on the very next tick.
    sim.submit(Command::SetPinOutput {
        board,
        pin: LED_PIN.into(),
        level: Some(true),
    });
    let report = sim.frame().report.expect("host loop ticks");
    assert_eq!(report.events.len(), 1);
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn scheduled_stop_halts_both_modes_on_the_same_tick() {
    for settings in [Settings::default(), worker_settings()] {
        let mut sim = Simulation::start(led_circuit().into_state(1), &settings);
        sim.submit(ScheduledCommand::at(19, Command::SetRunning { running: false }));
        sim.play();
        // A worker STATE from before PLAY may briefly report it paused.
        frame_until(&mut sim, |s| !s.running && s.tick > 0);
        assert_eq!(sim.state().tick, 20, "{:?}", settings.mode);
        sim.dispose();
    }
}

#[test]
fn worker_error_falls_back_to_host_loop() {
    let mut sim =
        Simulation::start_with_factory(led_circuit().into_state(1), &worker_settings(), Box::new(CrashOnPlay));
    assert_eq!(sim.mode(), RuntimeMode::Worker);
    let warnings = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&warnings);
    sim.subscribe(EventKind::Warning, Box::new(move |_| *sink.borrow_mut() += 1));

    sim.play();
    let deadline = Instant::now() + WAIT;
    let errors = loop {
        let frame = sim.frame();
        if !frame.errors.is_empty() {
            break frame.errors;
        }
        assert!(Instant::now() < deadline, "no error arrived");
        std::thread::sleep(Duration::from_millis(1));
    };
    assert_eq!(errors, vec!["engine crashed".to_string()]);
    assert_eq!(sim.mode(), RuntimeMode::HostLoop);
    assert_eq!(*warnings.borrow(), 1);

    // Still playing, and ticking on the host now.
    assert!(sim.state().running);
    let report = sim.frame().report.expect("host loop ticks");
    assert_eq!(report.tick, 0);
    assert_eq!(sim.state().tick, 1);
}

#[test]
fn slow_host_still_receives_every_event() {
    let slow_worker = Settings {
        worker: WorkerConfig {
            channel_capacity: 2,
            ..worker_settings().worker
        },
        ..worker_settings()
    };
    for settings in [Settings::default(), slow_worker] {
        let circuit = led_circuit();
        let board = circuit.board.clone();
        let mut sim = Simulation::start(circuit.into_state(1), &settings);
        let seen = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&seen);
        sim.subscribe(EventKind::OutputPinSet, Box::new(move |_| *sink.borrow_mut() += 1));

        for tick in 1..=60 {
            sim.submit(ScheduledCommand::at(
                tick,
                Command::SetPinOutput {
                    board: board.clone(),
                    pin: LED_PIN.into(),
                    level: Some(tick % 2 == 1),
                },
            ));
        }
        sim.submit(ScheduledCommand::at(61, Command::SetRunning { running: false }));
        sim.play();
        if settings.mode == RuntimeMode::Worker {
            // Busy host: nothing is drained for a while.
            std::thread::sleep(Duration::from_millis(300));
        }
        frame_until(&mut sim, |s| !s.running && s.tick > 0);

        assert_eq!(sim.state().tick, 62, "{:?}", settings.mode);
        assert_eq!(*seen.borrow(), 60, "{:?}", settings.mode);
        sim.dispose();
    }
}
