//! Simulation session
//!
//! Owns the physics world plus everything layered on top of it (clock,
//! field, robot, recorder). A session goes through setup once, is stepped
//! and reset any number of times and ends with teardown.

use crate::config::SimConfig;
use crate::consts::DEBOUNCE_DELAY;
use crate::error::{Result, SimError};
use crate::recording::{Recorder, StepRecord};
use crate::world::{Frame, PhysicsWorld, Pose, SnapshotHandle, ViewParams};

use super::agent::{MobileAgent, WheelVelocities};
use super::clock::{ClockPhase, GameClock};
use super::field::Field;
use super::scoring::{ScoreReport, TargetSequence};

pub struct Session<W: PhysicsWorld> {
    config: SimConfig,
    world: W,
    clock: GameClock,
    field: Field,
    agent: MobileAgent,
    /// World state right after setup, restored by `reset`
    reset_snapshot: SnapshotHandle,
    recorder: Option<Recorder>,
    steps: u64,
}

impl<W: PhysicsWorld> Session<W> {
    /// Validate the config, prepare the world and start the clock
    pub fn setup(config: SimConfig, mut world: W) -> Result<Self> {
        config.validate()?;
        world.configure_display(&config.display_options());

        if let Some(path) = &config.starting_state {
            let handle = world.load_snapshot(path)?;
            world.restore_snapshot(handle)?;
        }

        let layout = world.layout();
        let agent = MobileAgent::new(
            &layout,
            config.wheel_skew,
            config.encoder_noise,
            config.seed,
        );
        if let Some(pose) = config.starting_pose {
            agent.set_pose(&mut world, pose)?;
        }
        agent.apply(&mut world)?;

        let field = Field::new(&layout, DEBOUNCE_DELAY, TargetSequence::pi())?;

        let recorder = match &config.log_dir {
            Some(dir) if config.log_states || config.record_frames => Some(Recorder::open(
                dir,
                config.log_states,
                config.record_frames,
            )?),
            _ => None,
        };

        let reset_snapshot = world.capture_snapshot()?;

        let mut clock = GameClock::new(config.clock_mode(), config.dt);
        clock.start(config.starting_time, config.auto_enable_delay);

        log::info!(
            "Session ready: {:?} clock (dt={:.5}s) at t={:.3}s, auto-enable {}",
            clock.mode(),
            clock.dt(),
            clock.time(),
            if config.auto_enable_delay > 0.0 {
                format!("after {:.3}s", config.auto_enable_delay)
            } else {
                "off".to_string()
            }
        );

        Ok(Self {
            config,
            world,
            clock,
            field,
            agent,
            reset_snapshot,
            recorder,
            steps: 0,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        match self.clock.phase() {
            ClockPhase::Running => Ok(()),
            ClockPhase::Uninitialized => Err(SimError::NotStarted),
            ClockPhase::Terminated => Err(SimError::SessionClosed),
        }
    }

    /// Advance the whole session by one tick
    ///
    /// Button sensors are read before the clock moves, so a failed read
    /// leaves time untouched. Motor writes after the tick are not rolled back.
    pub fn step(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.field.monitor(&self.world)?;

        let tick = self.clock.tick()?;
        if tick.auto_enable_fired {
            log::info!("Auto-enable at t={:.3}s", self.clock.time());
            self.agent.set_enabled(&mut self.world, true)?;
        }
        self.field.update(tick.dt);

        self.agent.apply(&mut self.world)?;
        self.world.advance(tick.dt);
        self.steps += 1;

        self.record()
    }

    fn record(&mut self) -> Result<()> {
        let Some(recorder) = self.recorder.as_mut() else {
            return Ok(());
        };

        if recorder.logs_states() {
            recorder.record_step(&StepRecord {
                step: self.steps,
                time: self.clock.time(),
                enabled: self.agent.enabled(),
                pose: self.agent.pose(&self.world)?,
                score: self.field.score().into(),
            });
        }

        if recorder.wants_frame(self.steps) {
            let view = if self.config.topdown_view {
                ViewParams::top_down()
            } else {
                self.agent.camera_view(&self.world)?
            };
            let frame = self.world.render_frame(&view);
            recorder.record_frame(self.steps, &frame);
        }
        Ok(())
    }

    /// Back to the state right after setup; returns the restored time
    pub fn reset(&mut self) -> Result<f64> {
        self.ensure_open()?;
        self.world.restore_snapshot(self.reset_snapshot)?;
        let time = self.clock.reset()?;
        self.field.reset();
        self.agent.reset(&mut self.world)?;
        self.steps = 0;
        log::info!("Session reset to t={time:.3}s");
        Ok(time)
    }

    /// Save the final world state if recording and close the session
    pub fn teardown(&mut self) -> Result<()> {
        self.ensure_open()?;

        if let Some(recorder) = self.recorder.as_mut() {
            if recorder.logs_states() {
                let path = recorder.final_state_path();
                let saved = self
                    .world
                    .capture_snapshot()
                    .and_then(|handle| self.world.save_snapshot(handle, &path));
                if let Err(e) = saved {
                    log::warn!("Final state not saved: {e}");
                }
            }
            recorder.flush();
        }

        self.clock.terminate();
        log::info!(
            "Session closed after {} steps, score {}",
            self.steps,
            self.field.score().score()
        );
        Ok(())
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn set_time(&mut self, time: f64) -> Result<f64> {
        self.clock.set_time(time)
    }

    pub fn pose(&self) -> Result<Pose> {
        self.ensure_open()?;
        self.agent.pose(&self.world)
    }

    pub fn set_pose(&mut self, pose: Pose) -> Result<Pose> {
        self.ensure_open()?;
        self.agent.set_pose(&mut self.world, pose)
    }

    pub fn capture_image(&self) -> Result<Frame> {
        self.ensure_open()?;
        self.agent.capture_image(&self.world)
    }

    pub fn wheel_velocities(&mut self) -> Result<WheelVelocities> {
        self.ensure_open()?;
        self.agent.read_wheel_velocities(&self.world)
    }

    pub fn command_wheel_velocities(&mut self, target: WheelVelocities) -> Result<WheelVelocities> {
        self.ensure_open()?;
        self.agent.command_wheel_velocities(&mut self.world, target)
    }

    pub fn enabled(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.agent.enabled())
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<bool> {
        self.ensure_open()?;
        self.agent.set_enabled(&mut self.world, enabled)
    }

    pub fn score(&self) -> ScoreReport {
        self.field.score().into()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn agent(&self) -> &MobileAgent {
        &self.agent
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// Steps taken since setup or the last reset
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_open(&self) -> bool {
        self.clock.phase() == ClockPhase::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use std::path::Path;

    use crate::world::{
        BodyId, ButtonPress, DisplayOptions, JointId, JointState, KinematicWorld, WorldLayout,
    };

    fn session() -> Session<KinematicWorld> {
        Session::setup(SimConfig::headless(), KinematicWorld::arena()).unwrap()
    }

    /// Arena whose sensor reads or snapshot restores can be made to fail
    struct FaultyWorld {
        inner: KinematicWorld,
        fail_reads: bool,
        fail_restore: bool,
    }

    impl PhysicsWorld for FaultyWorld {
        fn layout(&self) -> WorldLayout {
            self.inner.layout()
        }

        fn configure_display(&mut self, display: &DisplayOptions) {
            self.inner.configure_display(display);
        }

        fn advance(&mut self, dt: f64) {
            self.inner.advance(dt);
        }

        fn body_pose(&self, body: BodyId) -> Result<Pose> {
            self.inner.body_pose(body)
        }

        fn set_body_pose(&mut self, body: BodyId, pose: Pose) -> Result<()> {
            self.inner.set_body_pose(body, pose)
        }

        fn set_joint_velocity_target(
            &mut self,
            body: BodyId,
            joint: JointId,
            velocity: f32,
            max_force: f32,
        ) -> Result<()> {
            self.inner
                .set_joint_velocity_target(body, joint, velocity, max_force)
        }

        fn joint_state(&self, body: BodyId, joint: JointId) -> Result<JointState> {
            if self.fail_reads {
                return Err(SimError::out_of_range("joint", joint, 0));
            }
            self.inner.joint_state(body, joint)
        }

        fn render_frame(&self, view: &ViewParams) -> Frame {
            self.inner.render_frame(view)
        }

        fn capture_snapshot(&mut self) -> Result<SnapshotHandle> {
            self.inner.capture_snapshot()
        }

        fn restore_snapshot(&mut self, handle: SnapshotHandle) -> Result<()> {
            if self.fail_restore {
                return Err(SimError::Snapshot("restore refused".into()));
            }
            self.inner.restore_snapshot(handle)
        }

        fn load_snapshot(&mut self, path: &Path) -> Result<SnapshotHandle> {
            self.inner.load_snapshot(path)
        }

        fn save_snapshot(&self, handle: SnapshotHandle, path: &Path) -> Result<()> {
            self.inner.save_snapshot(handle, path)
        }
    }

    fn faulty_session() -> Session<FaultyWorld> {
        let world = FaultyWorld {
            inner: KinematicWorld::arena(),
            fail_reads: false,
            fail_restore: false,
        };
        Session::setup(SimConfig::headless(), world).unwrap()
    }

    #[test]
    fn test_failed_sensor_read_leaves_clock_alone() {
        let mut session = faulty_session();
        session.step().unwrap();
        let time = session.time();

        session.world_mut().fail_reads = true;
        assert!(session.step().is_err());
        assert_eq!(session.time(), time);
        assert_eq!(session.steps(), 1);
        assert_eq!(session.world().inner.advance_count(), 1);

        session.world_mut().fail_reads = false;
        session.step().unwrap();
        assert!((session.time() - 2.0 * SIM_DT).abs() < 1e-12);
    }

    #[test]
    fn test_failed_restore_leaves_clock_alone() {
        let mut session = faulty_session();
        session.set_time(5.0).unwrap();
        session.step().unwrap();

        session.world_mut().fail_restore = true;
        assert!(matches!(session.reset(), Err(SimError::Snapshot(_))));
        assert!((session.time() - (5.0 + SIM_DT)).abs() < 1e-12);
        assert_eq!(session.steps(), 1);

        session.world_mut().fail_restore = false;
        assert_eq!(session.reset().unwrap(), 0.0);
    }

    #[test]
    fn test_steps_advance_time_and_world() {
        let mut session = session();
        for _ in 0..5 {
            session.step().unwrap();
        }
        assert!((session.time() - 5.0 * SIM_DT).abs() < 1e-12);
        assert_eq!(session.world().advance_count(), 5);
        assert_eq!(session.steps(), 5);
    }

    #[test]
    fn test_invalid_config_fails_setup() {
        let config = SimConfig {
            wheel_skew: f32::NAN,
            ..SimConfig::headless()
        };
        assert!(matches!(
            Session::setup(config, KinematicWorld::arena()),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_starting_pose_and_time() {
        let config = SimConfig {
            starting_pose: Some(Pose::new(0.2, 0.3, 1.0)),
            starting_time: 4.0,
            ..SimConfig::headless()
        };
        let mut session = Session::setup(config, KinematicWorld::arena()).unwrap();
        assert_eq!(session.pose().unwrap(), Pose::new(0.2, 0.3, 1.0));
        assert_eq!(session.time(), 4.0);
        assert!(!session.world().display().interactive);

        session.set_pose(Pose::new(-0.5, 0.0, 0.0)).unwrap();
        assert_eq!(session.reset().unwrap(), 4.0);
        assert_eq!(session.pose().unwrap(), Pose::new(0.2, 0.3, 1.0));
    }

    #[test]
    fn test_reset_restores_post_setup_state() {
        let mut session = session();
        session.set_enabled(true).unwrap();
        session
            .command_wheel_velocities(WheelVelocities::new(8.0, 8.0))
            .unwrap();
        session.world_mut().press_button(3).unwrap();
        for _ in 0..20 {
            session.step().unwrap();
        }
        session.world_mut().release_button(3).unwrap();
        for _ in 0..20 {
            session.step().unwrap();
        }
        assert!(session.pose().unwrap().position.x > 0.0);
        assert_eq!(session.score().num_sequenced, 1);

        assert_eq!(session.reset().unwrap(), 0.0);
        assert_eq!(session.pose().unwrap(), Pose::default());
        assert!(!session.enabled().unwrap());
        assert_eq!(session.score().score, 0);
        assert!(session.score().in_sequence);
        assert_eq!(session.wheel_velocities().unwrap(), WheelVelocities::ZERO);
        assert_eq!(session.steps(), 0);
    }

    #[test]
    fn test_auto_enable_after_delay() {
        let config = SimConfig {
            auto_enable_delay: 0.1,
            ..SimConfig::headless()
        };
        let mut session = Session::setup(config, KinematicWorld::arena()).unwrap();
        for _ in 0..23 {
            session.step().unwrap();
        }
        assert!(!session.enabled().unwrap());
        for _ in 0..2 {
            session.step().unwrap();
        }
        assert!(session.enabled().unwrap());

        // Re-armed by reset
        session.reset().unwrap();
        assert!(!session.enabled().unwrap());
        for _ in 0..30 {
            session.step().unwrap();
        }
        assert!(session.enabled().unwrap());
    }

    #[test]
    fn test_scripted_presses_score() {
        // 3, 1, 4 held for 50 ms each with 50 ms gaps
        let script = [3usize, 1, 4]
            .iter()
            .enumerate()
            .flat_map(|(i, &button)| {
                let at = 0.1 * i as f64 + 0.01;
                [
                    ButtonPress { at, button, pressed: true },
                    ButtonPress { at: at + 0.05, button, pressed: false },
                ]
            })
            .collect();
        let world = KinematicWorld::arena().with_button_script(script);
        let mut session = Session::setup(SimConfig::headless(), world).unwrap();
        for _ in 0..120 {
            session.step().unwrap();
        }
        let score = session.score();
        assert_eq!(score.num_sequenced, 3);
        assert_eq!(score.extra_not_sequenced, 0);
        assert_eq!(score.score, 30);
    }

    #[test]
    fn test_teardown_closes_session() {
        let mut session = session();
        session.step().unwrap();
        session.teardown().unwrap();
        assert!(!session.is_open());
        assert_eq!(session.step(), Err(SimError::SessionClosed));
        assert_eq!(session.reset(), Err(SimError::SessionClosed));
        assert_eq!(session.pose(), Err(SimError::SessionClosed));
        assert_eq!(session.teardown(), Err(SimError::SessionClosed));
    }

    #[test]
    fn test_set_time_only_moves_clock() {
        let mut session = session();
        assert_eq!(session.set_time(12.5).unwrap(), 12.5);
        session.step().unwrap();
        assert!((session.time() - (12.5 + SIM_DT)).abs() < 1e-12);
        assert_eq!(session.world().time(), SIM_DT);
    }

    #[test]
    fn test_recording_writes_states_and_final_snapshot() {
        let dir = std::env::temp_dir().join(format!("pibot-session-rec-{}", std::process::id()));
        let config = SimConfig {
            log_dir: Some(dir.clone()),
            log_states: true,
            record_frames: true,
            topdown_view: true,
            ..SimConfig::headless()
        };
        let mut session = Session::setup(config, KinematicWorld::arena()).unwrap();
        for _ in 0..16 {
            session.step().unwrap();
        }
        session.teardown().unwrap();

        let states = std::fs::read_to_string(dir.join("states.jsonl")).unwrap();
        assert_eq!(states.lines().count(), 16);
        assert!(dir.join("final_state.json").exists());
        assert!(dir.join("frames").join("frame_00000008.ppm").exists());
        assert!(dir.join("frames").join("frame_00000016.ppm").exists());

        // The saved state is a loadable starting state
        let config = SimConfig {
            starting_state: Some(dir.join("final_state.json")),
            ..SimConfig::headless()
        };
        assert!(Session::setup(config, KinematicWorld::arena()).is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }
}
