//! Input command queue for renderer edits and external stimuli.
//!
//! Commands are queued by the renderer, tests or the device bridge and
//! executed at tick boundaries so both runtime modes apply the same input
//! on the same tick. A command may be scheduled for a specific tick; an
//! unscheduled command runs at the start of the next tick.

use serde::{Deserialize, Serialize};

use crate::component::{Component, Position, Wire};
use crate::fixed::{Fixed64, Ticks};
use crate::id::{ComponentId, PinId, WireId};

// ---------------------------------------------------------------------------
// Command enum
// ---------------------------------------------------------------------------

/// A single command that can be submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    // -- Structural edits --
    AddComponent { component: Component },
    /// Remove a component and every wire touching it.
    RemoveComponent { id: ComponentId },
    MoveComponent {
        id: ComponentId,
        position: Position,
        rotation: u16,
    },
    AddWire { wire: Wire },
    RemoveWire { id: WireId },

    // -- Clock --
    SetRunning { running: bool },
    /// Clamped into `[0, MAX_TIME_SCALE]` (see [`crate::engine::MAX_TIME_SCALE`]).
    SetTimeScale { scale: Fixed64 },

    // -- Stimuli --
    /// Drive a board pin HIGH/LOW, or release it back to input (`None`).
    SetPinOutput {
        board: ComponentId,
        pin: PinId,
        level: Option<bool>,
    },
    /// Drive a PWM duty cycle in [0, 1], or release the pin (`None`).
    SetPwmOutput {
        board: ComponentId,
        pin: PinId,
        duty: Option<Fixed64>,
    },
    SetButton { id: ComponentId, pressed: bool },
    SetPotentiometer { id: ComponentId, wiper: Fixed64 },
    /// Pin a sensor to a test value, or return it to its model (`None`).
    InjectSensor { id: ComponentId, value: Option<Fixed64> },
    SetServoTarget { id: ComponentId, degrees: Fixed64 },
}

impl Command {
    /// Whether applying this command can change topology.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Command::AddComponent { .. }
                | Command::RemoveComponent { .. }
                | Command::AddWire { .. }
                | Command::RemoveWire { .. }
        )
    }
}

/// A command plus the tick it should run on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCommand {
    /// `None` runs at the next tick boundary.
    #[serde(default)]
    pub at_tick: Option<Ticks>,
    pub command: Command,
}

impl ScheduledCommand {
    pub fn now(command: Command) -> Self {
        Self {
            at_tick: None,
            command,
        }
    }

    pub fn at(tick: Ticks, command: Command) -> Self {
        Self {
            at_tick: Some(tick),
            command,
        }
    }

    fn is_due(&self, tick: Ticks) -> bool {
        self.at_tick.is_none_or(|t| t <= tick)
    }
}

impl From<Command> for ScheduledCommand {
    fn from(command: Command) -> Self {
        Self::now(command)
    }
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// A queue of commands waiting to be executed at a tick boundary.
///
/// Supports optional history tracking for replay and debugging.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    /// Commands waiting to be executed, in submission order.
    pending: Vec<ScheduledCommand>,
    /// History of executed commands: (tick, command).
    history: Vec<(Ticks, Command)>,
    /// Maximum history entries to retain. 0 = no history.
    max_history: usize,
}

impl CommandQueue {
    /// Create a new empty command queue with no history tracking.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new command queue that retains up to `max_history` entries.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            max_history,
            ..Self::default()
        }
    }

    pub fn push(&mut self, command: impl Into<ScheduledCommand>) {
        self.pending.push(command.into());
    }

    pub fn push_batch(&mut self, commands: impl IntoIterator<Item = ScheduledCommand>) {
        self.pending.extend(commands);
    }

    /// Remove and return every command due at `tick`, in submission order.
    /// Later-scheduled commands stay queued.
    pub fn drain_due(&mut self, tick: Ticks) -> Vec<Command> {
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|c| c.is_due(tick));
        self.pending = later;
        let commands: Vec<Command> = due.into_iter().map(|c| c.command).collect();

        if self.max_history > 0 {
            for cmd in &commands {
                self.history.push((tick, cmd.clone()));
            }
            let excess = self.history.len().saturating_sub(self.max_history);
            if excess > 0 {
                self.history.drain(..excess);
            }
        }

        commands
    }

    /// Commands still waiting, in submission order.
    pub fn pending(&self) -> &[ScheduledCommand] {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every pending command, scheduled or not.
    pub fn take_pending(&mut self) -> Vec<ScheduledCommand> {
        std::mem::take(&mut self.pending)
    }

    /// Get the command history (tick, command) pairs.
    pub fn history(&self) -> &[(Ticks, Command)] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
