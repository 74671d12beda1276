//! Game clock
//!
//! Tracks session time in one of two modes and runs the auto-enable
//! countdown. Real-time mode follows the wall clock; fixed-step mode adds the
//! configured tick on every step and never reads the wall clock.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockMode {
    RealTime,
    FixedStep,
}

/// Lifecycle of the clock (and of the session owning it)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPhase {
    Uninitialized,
    Running,
    Terminated,
}

/// What a single clock step produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    /// Seconds added to the clock
    pub dt: f64,
    /// The auto-enable countdown expired during this step
    pub auto_enable_fired: bool,
}

#[derive(Debug, Clone)]
pub struct GameClock {
    mode: ClockMode,
    phase: ClockPhase,
    /// Fixed-step tick (seconds)
    dt: f64,
    time: f64,
    starting_time: f64,
    auto_enable_delay: f64,
    auto_enable_remaining: f64,
    auto_enabled: bool,
    last_wall: Option<Instant>,
}

impl GameClock {
    pub fn new(mode: ClockMode, dt: f64) -> Self {
        Self {
            mode,
            phase: ClockPhase::Uninitialized,
            dt,
            time: 0.0,
            starting_time: 0.0,
            auto_enable_delay: 0.0,
            auto_enable_remaining: 0.0,
            auto_enabled: false,
            last_wall: None,
        }
    }

    /// Arm the clock. A zero `auto_enable_delay` disables auto-enable.
    pub fn start(&mut self, starting_time: f64, auto_enable_delay: f64) {
        self.starting_time = starting_time;
        self.auto_enable_delay = auto_enable_delay;
        self.phase = ClockPhase::Running;
        self.restore();
    }

    fn restore(&mut self) {
        self.time = self.starting_time;
        self.auto_enable_remaining = self.auto_enable_delay;
        self.auto_enabled = false;
        self.last_wall = match self.mode {
            ClockMode::RealTime => Some(Instant::now()),
            ClockMode::FixedStep => None,
        };
    }

    fn ensure_running(&self) -> Result<()> {
        match self.phase {
            ClockPhase::Running => Ok(()),
            ClockPhase::Uninitialized => Err(SimError::NotStarted),
            ClockPhase::Terminated => Err(SimError::SessionClosed),
        }
    }

    /// Advance by one step of the configured mode
    pub fn tick(&mut self) -> Result<ClockTick> {
        self.ensure_running()?;
        let delta = match self.mode {
            ClockMode::FixedStep => self.dt,
            ClockMode::RealTime => {
                let now = Instant::now();
                let elapsed = self
                    .last_wall
                    .map(|last| now.duration_since(last).as_secs_f64())
                    .unwrap_or(0.0);
                self.last_wall = Some(now);
                elapsed
            }
        };
        Ok(self.advance_by(delta))
    }

    fn advance_by(&mut self, delta: f64) -> ClockTick {
        self.time += delta;

        let mut fired = false;
        if !self.auto_enabled && self.auto_enable_remaining > 0.0 {
            self.auto_enable_remaining -= delta;
            if self.auto_enable_remaining <= 0.0 {
                self.auto_enabled = true;
                fired = true;
            }
        }

        ClockTick {
            dt: delta,
            auto_enable_fired: fired,
        }
    }

    /// Back to the values captured by `start`; returns the restored time
    pub fn reset(&mut self) -> Result<f64> {
        self.ensure_running()?;
        self.restore();
        Ok(self.time)
    }

    /// Overwrite the clock from the controller
    pub fn set_time(&mut self, time: f64) -> Result<f64> {
        self.ensure_running()?;
        self.time = time;
        Ok(self.time)
    }

    pub fn terminate(&mut self) {
        self.phase = ClockPhase::Terminated;
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn phase(&self) -> ClockPhase {
        self.phase
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn auto_enabled(&self) -> bool {
        self.auto_enabled
    }

    pub fn auto_enable_remaining(&self) -> f64 {
        self.auto_enable_remaining
    }
}
