//! Breadboard Runtime -- runs a breadboard simulation either on the host's
//! frame loop or on a background worker, behind one [`Simulation`] API.
//!
//! - [`settings`] -- the persisted mode flag and worker tuning.
//! - [`protocol`] -- INIT / PLAY / PAUSE / STATE / WARNING / ERROR messages.
//! - [`host`] -- the per-frame host loop.
//! - [`worker`] -- the worker thread and its factory.
//! - [`reconcile`] -- applying STATE messages to the host's copy.
//! - [`runtime`] -- [`Simulation`], switching between the two.

pub mod host;
pub mod protocol;
pub mod reconcile;
pub mod runtime;
pub mod settings;
pub mod worker;

pub use runtime::{Frame, Simulation};
pub use settings::{RuntimeMode, Settings, WorkerConfig};
