//! Differential-drive robot driven by the controller
//!
//! The agent only issues motor targets and reads sensors through the
//! physics boundary; the engine moves the body.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::consts::WHEEL_MAX_FORCE;
use crate::error::Result;
use crate::world::{BodyId, Frame, JointId, PhysicsWorld, Pose, ViewParams, WorldLayout};

/// Wheel velocities in joint units (rad/s), forward positive on both sides
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelVelocities {
    pub left: f32,
    pub right: f32,
}

impl WheelVelocities {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }
}

/// Per-side multipliers modelling mismatched drive motors.
///
/// Positive skew speeds up the left wheel, negative skew the right one.
pub fn skew_factors(skew: f32) -> (f32, f32) {
    let left = if skew > 0.0 { skew.abs() + 1.0 } else { 1.0 };
    let right = if skew < 0.0 { skew.abs() + 1.0 } else { 1.0 };
    (left, right)
}

#[derive(Debug, Clone)]
pub struct MobileAgent {
    body: BodyId,
    left_joint: JointId,
    right_joint: JointId,
    max_force: f32,
    left_skew: f32,
    right_skew: f32,
    target: WheelVelocities,
    enabled: bool,
    /// Half-width of the uniform encoder noise (rad/s)
    encoder_noise: f32,
    seed: u64,
    rng: Pcg32,
}

impl MobileAgent {
    pub fn new(layout: &WorldLayout, skew: f32, encoder_noise: f32, seed: u64) -> Self {
        let (left_skew, right_skew) = skew_factors(skew);
        Self {
            body: layout.robot,
            left_joint: layout.left_wheel,
            right_joint: layout.right_wheel,
            max_force: WHEEL_MAX_FORCE,
            left_skew,
            right_skew,
            target: WheelVelocities::ZERO,
            enabled: false,
            encoder_noise,
            seed,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn target(&self) -> WheelVelocities {
        self.target
    }

    /// Push the current motor targets to the engine. Disabled robots hold zero.
    pub fn apply<W: PhysicsWorld + ?Sized>(&self, world: &mut W) -> Result<()> {
        let (left, right) = if self.enabled {
            // Right motor is mounted mirrored
            (
                self.target.left * self.left_skew,
                -self.target.right * self.right_skew,
            )
        } else {
            (0.0, 0.0)
        };
        world.set_joint_velocity_target(self.body, self.left_joint, left, self.max_force)?;
        world.set_joint_velocity_target(self.body, self.right_joint, right, self.max_force)
    }

    pub fn set_enabled<W: PhysicsWorld + ?Sized>(
        &mut self,
        world: &mut W,
        enabled: bool,
    ) -> Result<bool> {
        self.enabled = enabled;
        self.apply(world)?;
        Ok(self.enabled)
    }

    /// Set new wheel targets and report what the wheels settled on
    pub fn command_wheel_velocities<W: PhysicsWorld + ?Sized>(
        &mut self,
        world: &mut W,
        target: WheelVelocities,
    ) -> Result<WheelVelocities> {
        self.target = target;
        self.apply(world)?;
        self.read_wheel_velocities(world)
    }

    /// Measured wheel velocities, with encoder noise if configured
    pub fn read_wheel_velocities<W: PhysicsWorld + ?Sized>(
        &mut self,
        world: &W,
    ) -> Result<WheelVelocities> {
        let left = world.joint_state(self.body, self.left_joint)?.velocity;
        let right = -world.joint_state(self.body, self.right_joint)?.velocity;
        Ok(WheelVelocities::new(
            left + self.noise(),
            right + self.noise(),
        ))
    }

    fn noise(&mut self) -> f32 {
        if self.encoder_noise > 0.0 {
            self.rng.random_range(-self.encoder_noise..=self.encoder_noise)
        } else {
            0.0
        }
    }

    pub fn pose<W: PhysicsWorld + ?Sized>(&self, world: &W) -> Result<Pose> {
        world.body_pose(self.body)
    }

    /// Teleport the robot and report the pose the engine settled on
    pub fn set_pose<W: PhysicsWorld + ?Sized>(&self, world: &mut W, pose: Pose) -> Result<Pose> {
        world.set_body_pose(self.body, pose.normalized())?;
        self.pose(world)
    }

    pub fn camera_view<W: PhysicsWorld + ?Sized>(&self, world: &W) -> Result<ViewParams> {
        Ok(ViewParams::robot_camera(&self.pose(world)?))
    }

    pub fn capture_image<W: PhysicsWorld + ?Sized>(&self, world: &W) -> Result<Frame> {
        let view = self.camera_view(world)?;
        Ok(world.render_frame(&view))
    }

    /// Disabled, zero targets, noise stream rewound
    pub fn reset<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) -> Result<()> {
        self.target = WheelVelocities::ZERO;
        self.enabled = false;
        self.rng = Pcg32::seed_from_u64(self.seed);
        self.apply(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::KinematicWorld;

    fn agent(world: &KinematicWorld, skew: f32) -> MobileAgent {
        MobileAgent::new(&world.layout(), skew, 0.0, 7)
    }

    #[test]
    fn test_skew_factors() {
        assert_eq!(skew_factors(0.0), (1.0, 1.0));
        assert_eq!(skew_factors(0.2), (1.2, 1.0));
        assert_eq!(skew_factors(-0.5), (1.0, 1.5));
    }

    #[test]
    fn test_disabled_agent_holds_wheels() {
        let mut world = KinematicWorld::arena();
        let mut agent = agent(&world, 0.0);
        let read = agent
            .command_wheel_velocities(&mut world, WheelVelocities::new(2.0, 3.0))
            .unwrap();
        assert_eq!(read, WheelVelocities::ZERO);
        assert_eq!(agent.target(), WheelVelocities::new(2.0, 3.0));

        // Enabling applies the stored targets
        assert!(agent.set_enabled(&mut world, true).unwrap());
        let read = agent.read_wheel_velocities(&world).unwrap();
        assert_eq!(read, WheelVelocities::new(2.0, 3.0));
    }

    #[test]
    fn test_skew_shows_in_readback() {
        let mut world = KinematicWorld::arena();
        let mut agent = agent(&world, -0.5);
        agent.set_enabled(&mut world, true).unwrap();
        let read = agent
            .command_wheel_velocities(&mut world, WheelVelocities::new(2.0, 2.0))
            .unwrap();
        assert_eq!(read, WheelVelocities::new(2.0, 3.0));
    }

    #[test]
    fn test_forward_command_moves_forward() {
        let mut world = KinematicWorld::arena();
        let mut agent = agent(&world, 0.0);
        agent.set_enabled(&mut world, true).unwrap();
        agent
            .command_wheel_velocities(&mut world, WheelVelocities::new(5.0, 5.0))
            .unwrap();
        world.advance(0.5);
        let pose = agent.pose(&world).unwrap();
        assert!(pose.position.x > 0.0);
        assert!(pose.heading.abs() < 1e-5);
    }

    #[test]
    fn test_encoder_noise_bounded_and_repeatable() {
        let mut world = KinematicWorld::arena();
        let mut noisy = MobileAgent::new(&world.layout(), 0.0, 0.1, 42);
        let first: Vec<WheelVelocities> = (0..20)
            .map(|_| noisy.read_wheel_velocities(&world).unwrap())
            .collect();
        assert!(first.iter().all(|v| v.left.abs() <= 0.1 && v.right.abs() <= 0.1));
        assert!(first.iter().any(|v| v.left != 0.0));

        noisy.reset(&mut world).unwrap();
        let second: Vec<WheelVelocities> = (0..20)
            .map(|_| noisy.read_wheel_velocities(&world).unwrap())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_set_pose_round_trip() {
        let mut world = KinematicWorld::arena();
        let agent = agent(&world, 0.0);
        let pose = Pose::new(0.3, -0.4, 7.0);
        let settled = agent.set_pose(&mut world, pose).unwrap();
        assert_eq!(settled, pose.normalized());
        assert!(settled.heading < std::f32::consts::PI);
    }
}
