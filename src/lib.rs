//! PiBot Sim - remote-controllable simulation harness for the button wall challenge
//!
//! Core modules:
//! - `sim`: Session, game clock, debounce filter and sequence scoring
//! - `world`: Physics engine boundary plus a deterministic kinematic world
//! - `remote`: Command/response protocol, server loop and controller facade
//! - `config`: Session configuration (JSON, validated before use)
//! - `recording`: Optional per-step state log and frame capture

pub mod config;
pub mod error;
pub mod recording;
pub mod remote;
pub mod sim;
pub mod world;

pub use config::SimConfig;
pub use error::{Result, SimError};
pub use remote::{Command, Response, SimClient};
pub use sim::{ScoreReport, Session};
pub use world::{KinematicWorld, PhysicsWorld, Pose};

/// Simulation configuration constants
pub mod consts {
    /// Fixed simulation timestep (240 Hz, the physics engine default)
    pub const SIM_DT: f64 = 1.0 / 240.0;

    /// Minimum dwell time before a raw button reading is accepted (seconds)
    pub const DEBOUNCE_DELAY: f64 = 0.025;
    /// Buttons on the wall, one per digit
    pub const NUM_BUTTONS: usize = 10;
    /// Upper bound imposed by the press bitmask
    pub const MAX_BUTTONS: usize = 64;
    /// Button joint position below which the button reads as pressed (meters)
    pub const BUTTON_PRESS_DEPTH: f32 = -0.0038;
    /// Cap on points earned from presses outside the sequence
    pub const MAX_EXTRA_POINTS: u32 = 100;
    /// Points per digit sequenced in order
    pub const POINTS_PER_DIGIT: u32 = 10;

    /// Drive motor force limit
    pub const WHEEL_MAX_FORCE: f32 = 1.0;
    /// Height the robot base is placed at when its pose is reset (meters)
    pub const ROBOT_SPAWN_HEIGHT: f32 = 0.1;

    /// Robot camera defaults
    pub const CAMERA_WIDTH: u32 = 300;
    pub const CAMERA_HEIGHT: u32 = 300;
    pub const CAMERA_FOV_DEG: f32 = 45.0;
    pub const CAMERA_NEAR: f32 = 0.1;
    pub const CAMERA_FAR: f32 = 3.1;
    /// Camera mount height above the floor (meters)
    pub const CAMERA_MOUNT_HEIGHT: f32 = 0.12;
    /// Distance along the heading used as the look-at point
    pub const CAMERA_LOOK_AHEAD: f32 = 0.1;

    /// Record one frame every N steps (30 Hz at 240 Hz stepping)
    pub const FRAME_RECORD_INTERVAL: u64 = 8;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}
