//! Physics engine boundary
//!
//! The session never integrates physics itself. Everything it needs from the
//! engine goes through [`PhysicsWorld`]: advance one tick, read/write body
//! poses, drive joint motors, read joint sensors, render a frame and
//! capture/restore world snapshots.

pub mod frame;
pub mod kinematic;

use std::path::Path;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::Result;
use crate::normalize_angle;

pub use frame::{Frame, Rgba};
pub use kinematic::{ButtonPress, DriveGeometry, KinematicWorld};

/// Engine-assigned body identifier
pub type BodyId = usize;
/// Joint index within a body
pub type JointId = usize;

/// Planar robot pose (meters, radians)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec2,
    /// Heading about +z, kept in [-π, π)
    pub heading: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, heading: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            heading: normalize_angle(heading),
        }
    }

    /// Same pose with the heading wrapped into [-π, π)
    pub fn normalized(self) -> Self {
        Self {
            position: self.position,
            heading: normalize_angle(self.heading),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.heading.is_finite()
    }

    /// Unit vector along the heading
    pub fn forward(&self) -> Vec2 {
        Vec2::new(self.heading.cos(), self.heading.sin())
    }
}

/// Measured state of a single joint
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState {
    pub position: f32,
    pub velocity: f32,
}

/// Camera parameters handed to the engine's renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub width: u32,
    pub height: u32,
}

impl ViewParams {
    /// Forward-looking camera mounted on the robot
    pub fn robot_camera(pose: &Pose) -> Self {
        let eye = pose.position.extend(CAMERA_MOUNT_HEIGHT);
        let target = eye + (pose.forward() * CAMERA_LOOK_AHEAD).extend(0.0);
        Self {
            eye,
            target,
            up: Vec3::Z,
            fov_deg: CAMERA_FOV_DEG,
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            width: CAMERA_WIDTH,
            height: CAMERA_HEIGHT,
        }
    }

    /// Overhead view of the whole arena, +y up in the image
    pub fn top_down() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_deg: 60.0,
            near: 0.1,
            far: 4.0,
            width: CAMERA_WIDTH,
            height: CAMERA_HEIGHT,
        }
    }
}

/// Display flags forwarded to the engine at setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayOptions {
    pub interactive: bool,
    pub hide_ui: bool,
    pub topdown_view: bool,
}

/// Opaque reference to a world snapshot held by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotHandle(u64);

impl SnapshotHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Bodies and joints the session drives and monitors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldLayout {
    pub robot: BodyId,
    pub left_wheel: JointId,
    pub right_wheel: JointId,
    pub field: BodyId,
    /// Button joints on the field body, indexed by digit
    pub buttons: Vec<JointId>,
}

/// The physics engine as seen by the session.
///
/// Implementations own collision, contact and integration. All lookups by
/// body or joint fail with [`crate::SimError::OutOfRange`] on unknown ids.
pub trait PhysicsWorld: Send {
    /// Bodies and joints loaded into this world
    fn layout(&self) -> WorldLayout;

    /// Apply display flags (GUI visibility, camera placement)
    fn configure_display(&mut self, _display: &DisplayOptions) {}

    /// Advance the world by `dt` seconds
    fn advance(&mut self, dt: f64);

    fn body_pose(&self, body: BodyId) -> Result<Pose>;

    fn set_body_pose(&mut self, body: BodyId, pose: Pose) -> Result<()>;

    fn set_joint_velocity_target(
        &mut self,
        body: BodyId,
        joint: JointId,
        velocity: f32,
        max_force: f32,
    ) -> Result<()>;

    fn joint_state(&self, body: BodyId, joint: JointId) -> Result<JointState>;

    fn render_frame(&self, view: &ViewParams) -> Frame;

    fn capture_snapshot(&mut self) -> Result<SnapshotHandle>;

    fn restore_snapshot(&mut self, handle: SnapshotHandle) -> Result<()>;

    /// Load a persisted snapshot; the handle can then be restored
    fn load_snapshot(&mut self, path: &Path) -> Result<SnapshotHandle>;

    /// Persist a captured snapshot
    fn save_snapshot(&self, handle: SnapshotHandle, path: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_pose_new_normalizes_heading() {
        let pose = Pose::new(1.0, 2.0, 2.0 * PI + 0.5);
        assert!((pose.heading - 0.5).abs() < 1e-5);
        assert_eq!(pose.position, Vec2::new(1.0, 2.0));
    }

    #[test]
    fn test_robot_camera_looks_along_heading() {
        let pose = Pose::new(0.5, 0.0, PI / 2.0);
        let view = ViewParams::robot_camera(&pose);
        let dir = (view.target - view.eye).normalize();
        assert!(dir.x.abs() < 1e-5);
        assert!((dir.y - 1.0).abs() < 1e-5);
        assert_eq!(view.eye.z, CAMERA_MOUNT_HEIGHT);
    }
}
