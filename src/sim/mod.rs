//! Simulation session and game logic
//!
//! Everything here is deterministic in fixed-step mode:
//! - Time advances only through `Session::step`
//! - Encoder noise comes from a seeded RNG
//! - Buttons are visited in index order
//! - Physics is reached only through `PhysicsWorld`

pub mod agent;
pub mod buttons;
pub mod clock;
pub mod field;
pub mod scoring;
pub mod session;

pub use agent::{MobileAgent, WheelVelocities, skew_factors};
pub use buttons::{ButtonBank, ButtonEvents, ButtonState};
pub use clock::{ClockMode, ClockPhase, ClockTick, GameClock};
pub use field::Field;
pub use scoring::{PI_DIGITS, ScoreReport, SequenceScore, SequenceScorer, TargetSequence};
pub use session::Session;
