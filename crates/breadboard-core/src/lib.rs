//! Breadboard Core -- the circuit simulation engine.
//!
//! This crate models a breadboard of electronic parts (a microcontroller
//! board, LEDs, buttons, sensors, a servo, passives, rails and junctions)
//! wired together, and advances it in discrete ticks.
//!
//! # Tick pipeline
//!
//! Each call to [`engine::Engine::step`]:
//!
//! 1. **Commands** -- apply renderer edits and stimuli due at this tick.
//! 2. **Nets** -- partition pins into nets (cached per structural version).
//! 3. **Resolve** -- compute each net's level from its drivers, then clamp
//!    contested nets via the short-circuit detector.
//! 4. **Evaluate** -- update every component's props from the resolved nets.
//! 5. **Publish** -- deliver the tick's events synchronously on the bus.
//!
//! # Key Types
//!
//! - [`sim::SimState`] -- components, wires, clock, seed and versions.
//! - [`library`] -- factories for every supported part.
//! - [`net::build_nets`] -- union-find net builder.
//! - [`signal::resolve`] -- per-tick net resolution.
//! - [`event::EventBus`] -- synchronous publish/subscribe.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`snapshot`] -- versioned binary snapshots via bitcode.

pub mod behavior;
pub mod command_queue;
pub mod component;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod id;
pub mod library;
pub mod net;
pub mod profiling;
pub mod rng;
pub mod short;
pub mod signal;
pub mod sim;
pub mod snapshot;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
