//! Session configuration
//!
//! Loaded from JSON (missing fields take their defaults) and validated before
//! a session is created. Immutable once the session is running.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::SIM_DT;
use crate::error::{Result, SimError};
use crate::sim::ClockMode;
use crate::world::{DisplayOptions, Pose};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // === Display / stepping ===
    /// Run with the engine's GUI attached
    pub interactive: bool,
    /// Free-run against the wall clock (interactive sessions only)
    pub realtime: bool,
    /// Hide the engine's debug panels
    pub hide_ui: bool,
    /// Place the display camera overhead
    pub topdown_view: bool,
    /// Fixed-step tick (seconds)
    pub dt: f64,

    // === Starting state ===
    /// World snapshot to load before play
    pub starting_state: Option<PathBuf>,
    pub starting_pose: Option<Pose>,
    pub starting_time: f64,
    /// Seconds until the robot is enabled automatically (0 = never)
    pub auto_enable_delay: f64,

    // === Robot ===
    /// Drive motor mismatch, see `sim::agent::skew_factors`
    pub wheel_skew: f32,
    /// Half-width of uniform wheel encoder noise (rad/s)
    pub encoder_noise: f32,
    /// Seed for the encoder noise stream
    pub seed: u64,

    // === Recording ===
    pub log_dir: Option<PathBuf>,
    /// Write one JSON line per step and the final world snapshot
    pub log_states: bool,
    /// Write periodic PPM frames
    pub record_frames: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            interactive: true,
            realtime: true,
            hide_ui: true,
            topdown_view: false,
            dt: SIM_DT,

            starting_state: None,
            starting_pose: None,
            starting_time: 0.0,
            auto_enable_delay: 0.0,

            wheel_skew: 0.0,
            encoder_noise: 0.0,
            seed: 0,

            log_dir: None,
            log_states: false,
            record_frames: false,
        }
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SimError::InvalidConfig(format!(
            "{name} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}

impl SimConfig {
    /// No GUI, fixed-step time driven by the controller
    pub fn headless() -> Self {
        Self {
            interactive: false,
            realtime: false,
            ..Self::default()
        }
    }

    pub fn clock_mode(&self) -> ClockMode {
        if self.interactive && self.realtime {
            ClockMode::RealTime
        } else {
            ClockMode::FixedStep
        }
    }

    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            interactive: self.interactive,
            hide_ui: self.hide_ui,
            topdown_view: self.topdown_view,
        }
    }

    /// Check for values or combinations a session cannot run with
    pub fn validate(&self) -> Result<()> {
        non_negative("starting_time", self.starting_time)?;
        non_negative("auto_enable_delay", self.auto_enable_delay)?;
        non_negative("encoder_noise", self.encoder_noise as f64)?;

        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "dt must be finite and positive, got {}",
                self.dt
            )));
        }
        if !self.wheel_skew.is_finite() {
            return Err(SimError::InvalidConfig("wheel_skew must be finite".into()));
        }
        if self.starting_pose.is_some_and(|p| !p.is_finite()) {
            return Err(SimError::InvalidConfig("starting_pose must be finite".into()));
        }
        if self.realtime && !self.interactive {
            return Err(SimError::InvalidConfig(
                "real-time stepping requires an interactive session".into(),
            ));
        }
        if (self.log_states || self.record_frames) && self.log_dir.is_none() {
            return Err(SimError::InvalidConfig(
                "log_states/record_frames need a log_dir".into(),
            ));
        }
        Ok(())
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| SimError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| SimError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SimError::InvalidConfig(e.to_string()))?;
        fs::write(path, json)
            .map_err(|e| SimError::InvalidConfig(format!("{}: {e}", path.display())))
    }
}
