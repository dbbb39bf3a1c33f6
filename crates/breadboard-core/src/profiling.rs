//! Per-tick phase timing.
//!
//! Enabled at runtime through [`EngineConfig::profiler`](crate::engine::EngineConfig)
//! (the worker's INIT message carries the same flag). When disabled, no clock
//! is read.

use std::time::{Duration, Instant};

/// Per-phase timing from one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickProfile {
    pub commands: Duration,
    pub nets: Duration,
    pub resolve: Duration,
    pub evaluate: Duration,
    pub publish: Duration,
    pub total: Duration,
    pub tick: u64,
}

impl TickProfile {
    /// Returns the name and duration of the slowest phase.
    pub fn bottleneck_phase(&self) -> (&'static str, Duration) {
        let phases = [
            ("commands", self.commands),
            ("nets", self.nets),
            ("resolve", self.resolve),
            ("evaluate", self.evaluate),
            ("publish", self.publish),
        ];
        phases
            .into_iter()
            .fold(("commands", Duration::ZERO), |best, p| if p.1 > best.1 { p } else { best })
    }
}

/// Lap timer that is free when disabled.
#[derive(Debug)]
pub(crate) struct PhaseClock {
    start: Option<Instant>,
    last: Option<Instant>,
}

impl PhaseClock {
    pub(crate) fn new(enabled: bool) -> Self {
        let now = enabled.then(Instant::now);
        Self { start: now, last: now }
    }

    /// Time since the previous lap (zero when disabled).
    pub(crate) fn lap(&mut self) -> Duration {
        match self.last {
            Some(prev) => {
                let now = Instant::now();
                self.last = Some(now);
                now - prev
            }
            None => Duration::ZERO,
        }
    }

    pub(crate) fn total(&self) -> Option<Duration> {
        self.start.map(|s| s.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bottleneck_phase_identifies_slowest() {
        let profile = TickProfile {
            nets: Duration::from_micros(50),
            resolve: Duration::from_micros(10),
            evaluate: Duration::from_micros(200),
            ..Default::default()
        };
        assert_eq!(profile.bottleneck_phase(), ("evaluate", Duration::from_micros(200)));
    }

    #[test]
    fn disabled_clock_reports_nothing() {
        let mut clock = PhaseClock::new(false);
        assert_eq!(clock.lap(), Duration::ZERO);
        assert!(clock.total().is_none());
    }

    #[test]
    fn enabled_clock_measures() {
        let mut clock = PhaseClock::new(true);
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.lap() >= Duration::from_millis(2));
        assert!(clock.total().is_some());
    }
}
