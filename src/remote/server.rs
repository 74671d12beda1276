//! Server loop
//!
//! Each iteration first steps the session if it is free-running (real-time
//! clock) or holds step credit, then checks for one command. With nothing to
//! step the loop blocks until a command arrives, so an idle fixed-step
//! session costs nothing.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::sim::{ClockMode, Session, WheelVelocities};
use crate::world::PhysicsWorld;

use super::protocol::{Command, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

pub struct SimServer<W: PhysicsWorld> {
    session: Session<W>,
    requests: Receiver<Command>,
    responses: Sender<Response>,
    step_credit: u32,
    /// A `Sync` is waiting for the credit to run out
    sync_pending: bool,
    free_running: bool,
    /// Poll interval while free-running
    pace: Duration,
}

impl<W: PhysicsWorld> SimServer<W> {
    pub fn new(session: Session<W>, requests: Receiver<Command>, responses: Sender<Response>) -> Self {
        let free_running = session.clock().mode() == ClockMode::RealTime;
        let pace = Duration::from_secs_f64(session.clock().dt());
        Self {
            session,
            requests,
            responses,
            step_credit: 0,
            sync_pending: false,
            free_running,
            pace,
        }
    }

    pub fn session(&self) -> &Session<W> {
        &self.session
    }

    pub fn step_credit(&self) -> u32 {
        self.step_credit
    }

    /// Run until teardown or until the controller goes away
    pub fn run(mut self) {
        log::info!(
            "Server loop started ({})",
            if self.free_running { "free-running" } else { "stepped" }
        );
        while self.run_once() == LoopControl::Continue {}
        log::info!("Server loop stopped after {} steps", self.session.steps());
    }

    /// One loop iteration: maybe step, then handle at most one command
    pub fn run_once(&mut self) -> LoopControl {
        let stepping = self.free_running || self.step_credit > 0;
        if stepping {
            if let Err(e) = self.session.step() {
                log::error!("Step failed: {e}");
            }
            self.step_credit = self.step_credit.saturating_sub(1);
            if self.sync_pending && self.step_credit == 0 {
                self.sync_pending = false;
                if self.responses.send(Response::Ack(true)).is_err() {
                    return self.controller_gone();
                }
            }
        }

        let command = if self.free_running {
            match self.requests.recv_timeout(self.pace) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => return LoopControl::Continue,
                Err(RecvTimeoutError::Disconnected) => return self.controller_gone(),
            }
        } else if stepping {
            match self.requests.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => return LoopControl::Continue,
                Err(TryRecvError::Disconnected) => return self.controller_gone(),
            }
        } else {
            match self.requests.recv() {
                Ok(command) => command,
                Err(_) => return self.controller_gone(),
            }
        };

        let (response, control) = self.handle(command);
        if let Some(response) = response {
            if self.responses.send(response).is_err() {
                return self.controller_gone();
            }
        }
        control
    }

    fn controller_gone(&mut self) -> LoopControl {
        log::warn!("Controller disconnected, closing session");
        if self.session.is_open() {
            if let Err(e) = self.session.teardown() {
                log::error!("Teardown failed: {e}");
            }
        }
        LoopControl::Exit
    }

    /// Execute one command. `None` means the reply is deferred (`Sync`).
    pub fn handle(&mut self, command: Command) -> (Option<Response>, LoopControl) {
        log::debug!("Command {}", command.name());
        if let Err(e) = command.validate() {
            log::warn!("Rejected {}: {e}", command.name());
            return (Some(Response::Error(e)), LoopControl::Continue);
        }

        let session = &mut self.session;
        let result = match command {
            Command::Reset => session.reset().map(Response::Time),
            Command::Teardown => {
                let response = match session.teardown() {
                    Ok(()) => Response::Ack(true),
                    Err(e) => Response::Error(e),
                };
                return (Some(response), LoopControl::Exit);
            }
            Command::AdvanceSteps(n) => {
                self.step_credit = n;
                Ok(Response::Ack(true))
            }
            Command::Sync => {
                if self.step_credit > 0 {
                    self.sync_pending = true;
                    return (None, LoopControl::Continue);
                }
                Ok(Response::Ack(true))
            }
            Command::GetTime => Ok(Response::Time(session.time())),
            Command::SetTime(t) => session.set_time(t).map(Response::Time),
            Command::GetPose => session.pose().map(Response::Pose),
            Command::SetPose(pose) => session.set_pose(pose).map(Response::Pose),
            Command::GetImage => session.capture_image().map(Response::Image),
            Command::GetWheelVelocities => session.wheel_velocities().map(Response::WheelVelocities),
            Command::SetWheelVelocities { left, right } => session
                .command_wheel_velocities(WheelVelocities::new(left, right))
                .map(Response::WheelVelocities),
            Command::GetEnabled => session.enabled().map(Response::Enabled),
            Command::SetEnabled(enabled) => session.set_enabled(enabled).map(Response::Enabled),
            Command::GetScore => Ok(Response::Score(session.score())),
        };

        let response = result.unwrap_or_else(|e| {
            log::warn!("{} failed: {e}", command.name());
            Response::Error(e)
        });
        (Some(response), LoopControl::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::consts::SIM_DT;
    use crate::error::SimError;
    use crate::world::KinematicWorld;
    use crossbeam_channel::unbounded;

    struct Harness {
        server: SimServer<KinematicWorld>,
        requests: Sender<Command>,
        responses: Receiver<Response>,
    }

    fn harness() -> Harness {
        let session = Session::setup(SimConfig::headless(), KinematicWorld::arena()).unwrap();
        let (requests, request_rx) = unbounded();
        let (response_tx, responses) = unbounded();
        Harness {
            server: SimServer::new(session, request_rx, response_tx),
            requests,
            responses,
        }
    }

    #[test]
    fn test_advance_steps_runs_exactly_n_iterations() {
        let mut h = harness();
        h.requests.send(Command::AdvanceSteps(5)).unwrap();

        // First iteration has no credit yet and picks up the command
        assert_eq!(h.server.run_once(), LoopControl::Continue);
        assert_eq!(h.responses.try_recv(), Ok(Response::Ack(true)));
        assert_eq!(h.server.step_credit(), 5);

        for _ in 0..5 {
            assert_eq!(h.server.run_once(), LoopControl::Continue);
        }
        assert_eq!(h.server.step_credit(), 0);
        assert!((h.server.session().time() - 5.0 * SIM_DT).abs() < 1e-12);
        assert_eq!(h.server.session().world().advance_count(), 5);
    }

    #[test]
    fn test_advance_steps_replaces_credit() {
        let mut h = harness();
        h.requests.send(Command::AdvanceSteps(10)).unwrap();
        h.server.run_once();
        h.server.run_once();
        assert_eq!(h.server.step_credit(), 9);

        h.requests.send(Command::AdvanceSteps(2)).unwrap();
        h.server.run_once();
        // Stepped once more, then the new grant overwrote the remainder
        assert_eq!(h.server.step_credit(), 2);
        assert_eq!(h.server.session().world().advance_count(), 2);
    }

    #[test]
    fn test_sync_waits_for_credit() {
        let mut h = harness();
        h.requests.send(Command::AdvanceSteps(3)).unwrap();
        h.requests.send(Command::Sync).unwrap();

        h.server.run_once();
        assert_eq!(h.responses.try_recv(), Ok(Response::Ack(true)));

        // Steps 1 and 2; Sync is picked up after step 1 and deferred
        h.server.run_once();
        h.server.run_once();
        assert!(h.responses.try_recv().is_err());

        h.server.run_once();
        assert_eq!(h.responses.try_recv(), Ok(Response::Ack(true)));
        assert_eq!(h.server.session().steps(), 3);
    }

    #[test]
    fn test_sync_without_credit_answers_at_once() {
        let mut h = harness();
        let (response, control) = h.server.handle(Command::Sync);
        assert_eq!(response, Some(Response::Ack(true)));
        assert_eq!(control, LoopControl::Continue);
    }

    #[test]
    fn test_invalid_argument_is_protocol_violation() {
        let mut h = harness();
        let (response, _) = h.server.handle(Command::SetTime(f64::NAN));
        assert!(matches!(
            response,
            Some(Response::Error(SimError::ProtocolViolation(_)))
        ));
        // Clock untouched
        assert_eq!(h.server.session().time(), 0.0);
    }

    #[test]
    fn test_teardown_exits_loop() {
        let mut h = harness();
        h.requests.send(Command::Teardown).unwrap();
        assert_eq!(h.server.run_once(), LoopControl::Exit);
        assert_eq!(h.responses.try_recv(), Ok(Response::Ack(true)));
        assert!(!h.server.session().is_open());
    }

    #[test]
    fn test_disconnected_controller_closes_session() {
        let mut h = harness();
        drop(h.requests);
        assert_eq!(h.server.run_once(), LoopControl::Exit);
        assert!(!h.server.session().is_open());
    }

    #[test]
    fn test_query_commands() {
        let mut h = harness();
        assert_eq!(h.server.handle(Command::GetTime).0, Some(Response::Time(0.0)));
        assert_eq!(
            h.server.handle(Command::SetEnabled(true)).0,
            Some(Response::Enabled(true))
        );
        assert_eq!(
            h.server
                .handle(Command::SetWheelVelocities { left: 1.0, right: 2.0 })
                .0,
            Some(Response::WheelVelocities(WheelVelocities::new(1.0, 2.0)))
        );
        let Some(Response::Score(score)) = h.server.handle(Command::GetScore).0 else {
            panic!("expected a score");
        };
        assert_eq!(score.score, 0);
        let Some(Response::Image(frame)) = h.server.handle(Command::GetImage).0 else {
            panic!("expected an image");
        };
        assert_eq!((frame.width, frame.height), (300, 300));
    }
}
