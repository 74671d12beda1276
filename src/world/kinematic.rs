//! Deterministic kinematic world
//!
//! Reference engine used by the harness binary and the tests. Velocity
//! motors are ideal (a joint with a positive force limit runs at its target
//! immediately), the robot base follows differential-drive kinematics and
//! button joints only move when pushed from outside or by a press script.
//! There is no collision or contact handling.

use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::frame::{Frame, Rgba, colors};
use super::{
    BodyId, DisplayOptions, JointId, JointState, PhysicsWorld, Pose, SnapshotHandle, ViewParams,
    WorldLayout,
};
use crate::consts::*;
use crate::error::{Result, SimError};

/// Joint position a pressed button is pushed to (meters)
pub const BUTTON_PRESSED_POSITION: f32 = -0.005;
/// Drive wheel radius of the arena robot (meters)
pub const WHEEL_RADIUS: f32 = 0.03;
/// Distance between the drive wheels (meters)
pub const TRACK_WIDTH: f32 = 0.15;

/// Bodies are drawn as discs of this radius
const SPRITE_RADIUS: f32 = 0.06;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
struct Motor {
    target: f32,
    max_force: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BodyState {
    pose: Pose,
    height: f32,
    joints: Vec<JointState>,
    motors: Vec<Motor>,
}

impl BodyState {
    fn new(pose: Pose, height: f32, num_joints: usize) -> Self {
        Self {
            pose,
            height,
            joints: vec![JointState::default(); num_joints],
            motors: vec![Motor::default(); num_joints],
        }
    }
}

/// Wheel joints driving a body across the floor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGeometry {
    pub left: JointId,
    /// Mounted mirrored: positive joint velocity drives the body backwards
    pub right: JointId,
    pub wheel_radius: f32,
    pub track_width: f32,
}

#[derive(Debug, Clone)]
struct Body {
    name: &'static str,
    state: BodyState,
    drive: Option<DriveGeometry>,
    color: Option<Rgba>,
}

/// Scripted change of a button joint at a given world time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonPress {
    pub at: f64,
    pub button: usize,
    pub pressed: bool,
}

/// Everything a snapshot restores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WorldState {
    time: f64,
    script_cursor: usize,
    bodies: Vec<BodyState>,
}

#[derive(Debug)]
pub struct KinematicWorld {
    bodies: Vec<Body>,
    layout: WorldLayout,
    time: f64,
    script: Vec<ButtonPress>,
    script_cursor: usize,
    snapshots: Vec<WorldState>,
    display: DisplayOptions,
    advances: u64,
}

impl KinematicWorld {
    /// Arena with one differential-drive robot and the button wall
    pub fn arena() -> Self {
        let robot = Body {
            name: "robot",
            state: BodyState::new(Pose::default(), ROBOT_SPAWN_HEIGHT, 2),
            drive: Some(DriveGeometry {
                left: 0,
                right: 1,
                wheel_radius: WHEEL_RADIUS,
                track_width: TRACK_WIDTH,
            }),
            color: Some(colors::ROBOT),
        };
        let field = Body {
            name: "field",
            state: BodyState::new(Pose::default(), 0.0, NUM_BUTTONS),
            drive: None,
            color: None,
        };

        Self {
            bodies: vec![robot, field],
            layout: WorldLayout {
                robot: 0,
                left_wheel: 0,
                right_wheel: 1,
                field: 1,
                buttons: (0..NUM_BUTTONS).collect(),
            },
            time: 0.0,
            script: Vec::new(),
            script_cursor: 0,
            snapshots: Vec::new(),
            display: DisplayOptions::default(),
            advances: 0,
        }
    }

    /// Attach a button press script, applied as world time passes
    pub fn with_button_script(mut self, mut script: Vec<ButtonPress>) -> Self {
        script.sort_by(|a, b| a.at.total_cmp(&b.at));
        self.script = script;
        self.script_cursor = 0;
        self
    }

    /// World time accumulated by `advance`
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of `advance` calls since construction
    pub fn advance_count(&self) -> u64 {
        self.advances
    }

    pub fn display(&self) -> DisplayOptions {
        self.display
    }

    /// Push a joint to a position from outside the world
    pub fn set_joint_position(&mut self, body: BodyId, joint: JointId, position: f32) -> Result<()> {
        let state = &mut self.body_mut(body)?.state;
        let len = state.joints.len();
        let joint = state
            .joints
            .get_mut(joint)
            .ok_or_else(|| SimError::out_of_range("joint", joint, len))?;
        joint.position = position;
        Ok(())
    }

    pub fn press_button(&mut self, button: usize) -> Result<()> {
        self.set_button(button, true)
    }

    pub fn release_button(&mut self, button: usize) -> Result<()> {
        self.set_button(button, false)
    }

    fn set_button(&mut self, button: usize, pressed: bool) -> Result<()> {
        let joint = *self
            .layout
            .buttons
            .get(button)
            .ok_or_else(|| SimError::out_of_range("button", button, self.layout.buttons.len()))?;
        let position = if pressed { BUTTON_PRESSED_POSITION } else { 0.0 };
        self.set_joint_position(self.layout.field, joint, position)
    }

    fn body(&self, body: BodyId) -> Result<&Body> {
        self.bodies
            .get(body)
            .ok_or_else(|| SimError::out_of_range("body", body, self.bodies.len()))
    }

    fn body_mut(&mut self, body: BodyId) -> Result<&mut Body> {
        let len = self.bodies.len();
        self.bodies
            .get_mut(body)
            .ok_or_else(|| SimError::out_of_range("body", body, len))
    }

    fn apply_script(&mut self) {
        while let Some(press) = self.script.get(self.script_cursor).copied() {
            if press.at > self.time {
                break;
            }
            self.script_cursor += 1;
            if let Err(e) = self.set_button(press.button, press.pressed) {
                log::warn!("Skipping scripted button change: {e}");
            }
        }
    }

    fn world_state(&self) -> WorldState {
        WorldState {
            time: self.time,
            script_cursor: self.script_cursor,
            bodies: self.bodies.iter().map(|b| b.state.clone()).collect(),
        }
    }

    /// Reject snapshots that were not taken from a world of this shape
    fn check_shape(&self, state: &WorldState) -> Result<()> {
        if state.bodies.len() != self.bodies.len() {
            return Err(SimError::Snapshot(format!(
                "snapshot has {} bodies, world has {}",
                state.bodies.len(),
                self.bodies.len()
            )));
        }
        for (saved, body) in state.bodies.iter().zip(&self.bodies) {
            if saved.joints.len() != body.state.joints.len()
                || saved.motors.len() != body.state.motors.len()
            {
                return Err(SimError::Snapshot(format!(
                    "joint count mismatch for body `{}`",
                    body.name
                )));
            }
        }
        Ok(())
    }

    fn snapshot(&self, handle: SnapshotHandle) -> Result<&WorldState> {
        self.snapshots
            .get(handle.id() as usize)
            .ok_or_else(|| SimError::Snapshot(format!("unknown snapshot handle {}", handle.id())))
    }
}

/// Differential-drive update of a body pose from its wheel joint velocities
fn integrate_drive(state: &mut BodyState, drive: &DriveGeometry, dt: f32) {
    let (Some(left), Some(right)) = (state.joints.get(drive.left), state.joints.get(drive.right))
    else {
        return;
    };
    let v_left = left.velocity * drive.wheel_radius;
    let v_right = -right.velocity * drive.wheel_radius;

    let speed = 0.5 * (v_left + v_right);
    let yaw_rate = (v_right - v_left) / drive.track_width;

    let pose = &mut state.pose;
    let travel = pose.forward() * speed * dt;
    pose.position += travel;
    *pose = Pose::new(pose.position.x, pose.position.y, pose.heading + yaw_rate * dt);
}

fn fill_disc(frame: &mut Frame, cx: f32, cy: f32, radius: f32, color: Rgba) {
    let r2 = radius * radius;
    let (x0, x1) = ((cx - radius).floor() as i64, (cx + radius).ceil() as i64);
    let (y0, y1) = ((cy - radius).floor() as i64, (cy + radius).ceil() as i64);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            if dx * dx + dy * dy <= r2 {
                frame.put(x, y, color);
            }
        }
    }
}

impl PhysicsWorld for KinematicWorld {
    fn layout(&self) -> WorldLayout {
        self.layout.clone()
    }

    fn configure_display(&mut self, display: &DisplayOptions) {
        self.display = *display;
    }

    fn advance(&mut self, dt: f64) {
        self.time += dt;
        self.advances += 1;
        self.apply_script();

        let step = dt as f32;
        for body in &mut self.bodies {
            let state = &mut body.state;
            for (joint, motor) in state.joints.iter_mut().zip(state.motors.iter()) {
                if motor.max_force > 0.0 {
                    joint.velocity = motor.target;
                }
                joint.position += joint.velocity * step;
            }
            if let Some(drive) = body.drive {
                integrate_drive(state, &drive, step);
            }
        }
    }

    fn body_pose(&self, body: BodyId) -> Result<Pose> {
        Ok(self.body(body)?.state.pose)
    }

    fn set_body_pose(&mut self, body: BodyId, pose: Pose) -> Result<()> {
        self.body_mut(body)?.state.pose = pose.normalized();
        Ok(())
    }

    fn set_joint_velocity_target(
        &mut self,
        body: BodyId,
        joint: JointId,
        velocity: f32,
        max_force: f32,
    ) -> Result<()> {
        let state = &mut self.body_mut(body)?.state;
        let len = state.joints.len();
        if joint >= len {
            return Err(SimError::out_of_range("joint", joint, len));
        }
        state.motors[joint] = Motor {
            target: velocity,
            max_force,
        };
        if max_force > 0.0 {
            state.joints[joint].velocity = velocity;
        }
        Ok(())
    }

    fn joint_state(&self, body: BodyId, joint: JointId) -> Result<JointState> {
        let joints = &self.body(body)?.state.joints;
        joints
            .get(joint)
            .copied()
            .ok_or_else(|| SimError::out_of_range("joint", joint, joints.len()))
    }

    fn render_frame(&self, view: &ViewParams) -> Frame {
        let mut frame = Frame::new(view.width, view.height, colors::SKY);

        let forward = (view.target - view.eye).normalize_or_zero();
        let right = forward.cross(view.up).normalize_or_zero();
        if forward == Vec3::ZERO || right == Vec3::ZERO {
            return frame;
        }
        let up = right.cross(forward);
        let focal = 0.5 * view.height as f32 / (view.fov_deg.to_radians() * 0.5).tan();
        let cx = view.width as f32 * 0.5;
        let cy = view.height as f32 * 0.5;

        // Floor plane z = 0, one color per row. Rows whose center ray misses the
        // floor or hits it outside the clip range stay sky.
        for py in 0..view.height {
            let sy = (cy - (py as f32 + 0.5)) / focal;
            let ray = forward + up * sy;
            if ray.z >= 0.0 {
                continue;
            }
            // ray has unit length along forward, so t is the view depth
            let t = -view.eye.z / ray.z;
            if t < view.near || t > view.far {
                continue;
            }
            for px in 0..view.width {
                frame.put(px as i64, py as i64, colors::FLOOR);
            }
        }

        // Bodies back to front
        let mut sprites: Vec<(f32, Vec3, Rgba)> = self
            .bodies
            .iter()
            .filter_map(|b| {
                let color = b.color?;
                let rel = b.state.pose.position.extend(b.state.height) - view.eye;
                let depth = rel.dot(forward);
                (depth >= view.near && depth <= view.far).then_some((depth, rel, color))
            })
            .collect();
        sprites.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (depth, rel, color) in sprites {
            let sx = cx + focal * rel.dot(right) / depth;
            let sy = cy - focal * rel.dot(up) / depth;
            let radius = (focal * SPRITE_RADIUS / depth).max(1.0);
            fill_disc(&mut frame, sx, sy, radius, color);
        }

        frame
    }

    fn capture_snapshot(&mut self) -> Result<SnapshotHandle> {
        self.snapshots.push(self.world_state());
        Ok(SnapshotHandle::new(self.snapshots.len() as u64 - 1))
    }

    fn restore_snapshot(&mut self, handle: SnapshotHandle) -> Result<()> {
        let state = self.snapshot(handle)?.clone();
        self.check_shape(&state)?;
        self.time = state.time;
        self.script_cursor = state.script_cursor.min(self.script.len());
        for (body, saved) in self.bodies.iter_mut().zip(state.bodies) {
            body.state = saved;
        }
        Ok(())
    }

    fn load_snapshot(&mut self, path: &Path) -> Result<SnapshotHandle> {
        let json = fs::read_to_string(path)
            .map_err(|e| SimError::Snapshot(format!("{}: {e}", path.display())))?;
        let state: WorldState = serde_json::from_str(&json)
            .map_err(|e| SimError::Snapshot(format!("{}: {e}", path.display())))?;
        self.check_shape(&state)?;
        self.snapshots.push(state);
        log::info!("Loaded world snapshot from {}", path.display());
        Ok(SnapshotHandle::new(self.snapshots.len() as u64 - 1))
    }

    fn save_snapshot(&self, handle: SnapshotHandle, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self.snapshot(handle)?)
            .map_err(|e| SimError::Snapshot(e.to_string()))?;
        fs::write(path, json).map_err(|e| SimError::Snapshot(format!("{}: {e}", path.display())))
    }
}
