//! Controller-side facade
//!
//! Sets up a session, moves it onto a server thread and turns each call into
//! one command/response exchange. Calls take `&mut self`, so a client can
//! never have more than one request outstanding.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::sim::{ScoreReport, Session, WheelVelocities};
use crate::world::{Frame, PhysicsWorld, Pose};

use super::protocol::{Command, Response};
use super::server::SimServer;

pub struct SimClient {
    requests: Sender<Command>,
    responses: Receiver<Response>,
    server: Option<JoinHandle<()>>,
}

impl SimClient {
    /// Set up a session on `world` and start serving it.
    ///
    /// Setup errors are returned here, before any thread is started.
    pub fn start<W: PhysicsWorld + 'static>(config: SimConfig, world: W) -> Result<Self> {
        let session = Session::setup(config, world)?;
        let (requests, request_rx) = bounded(1);
        let (response_tx, responses) = bounded(1);
        let server = SimServer::new(session, request_rx, response_tx);
        let handle = thread::spawn(move || server.run());
        Ok(Self {
            requests,
            responses,
            server: Some(handle),
        })
    }

    /// Send one command and wait for its response
    pub fn send(&mut self, command: Command) -> Result<Response> {
        self.requests
            .send(command)
            .map_err(|_| SimError::SessionClosed)?;
        self.responses.recv().map_err(|_| SimError::SessionClosed)
    }

    fn exchange<T>(
        &mut self,
        command: Command,
        extract: impl FnOnce(Response) -> Option<T>,
    ) -> Result<T> {
        let name = command.name();
        match self.send(command)? {
            Response::Error(e) => Err(e),
            response => extract(response).ok_or_else(|| {
                SimError::ProtocolViolation(format!("unexpected response to {name}"))
            }),
        }
    }

    fn ack(&mut self, command: Command) -> Result<bool> {
        self.exchange(command, |r| match r {
            Response::Ack(ok) => Some(ok),
            _ => None,
        })
    }

    fn time(&mut self, command: Command) -> Result<f64> {
        self.exchange(command, |r| match r {
            Response::Time(t) => Some(t),
            _ => None,
        })
    }

    fn pose(&mut self, command: Command) -> Result<Pose> {
        self.exchange(command, |r| match r {
            Response::Pose(p) => Some(p),
            _ => None,
        })
    }

    fn wheels(&mut self, command: Command) -> Result<WheelVelocities> {
        self.exchange(command, |r| match r {
            Response::WheelVelocities(v) => Some(v),
            _ => None,
        })
    }

    fn enabled(&mut self, command: Command) -> Result<bool> {
        self.exchange(command, |r| match r {
            Response::Enabled(b) => Some(b),
            _ => None,
        })
    }

    /// Restore the post-setup state; returns the restored time
    pub fn restart(&mut self) -> Result<f64> {
        self.time(Command::Reset)
    }

    /// Close the session and wait for the server thread to finish
    pub fn end(&mut self) -> Result<bool> {
        let result = self.ack(Command::Teardown);
        if let Some(handle) = self.server.take() {
            if handle.join().is_err() {
                log::error!("Server thread panicked");
            }
        }
        result
    }

    /// Grant `n` steps; returns as soon as the grant is accepted
    pub fn step(&mut self, n: u32) -> Result<bool> {
        self.ack(Command::AdvanceSteps(n))
    }

    /// Grant `n` steps and wait until they have all run
    pub fn step_sync(&mut self, n: u32) -> Result<bool> {
        self.step(n)?;
        self.ack(Command::Sync)
    }

    pub fn get_time(&mut self) -> Result<f64> {
        self.time(Command::GetTime)
    }

    pub fn set_time(&mut self, time: f64) -> Result<f64> {
        self.time(Command::SetTime(time))
    }

    pub fn get_pose(&mut self) -> Result<Pose> {
        self.pose(Command::GetPose)
    }

    pub fn set_pose(&mut self, pose: Pose) -> Result<Pose> {
        self.pose(Command::SetPose(pose))
    }

    /// Frame from the robot camera
    pub fn read_cam(&mut self) -> Result<Frame> {
        self.exchange(Command::GetImage, |r| match r {
            Response::Image(frame) => Some(frame),
            _ => None,
        })
    }

    pub fn read_wheel_vels(&mut self) -> Result<WheelVelocities> {
        self.wheels(Command::GetWheelVelocities)
    }

    /// Set wheel targets; returns the velocities read back afterwards
    pub fn command_wheel_vels(&mut self, left: f32, right: f32) -> Result<WheelVelocities> {
        self.wheels(Command::SetWheelVelocities { left, right })
    }

    pub fn get_enabled(&mut self) -> Result<bool> {
        self.enabled(Command::GetEnabled)
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<bool> {
        self.enabled(Command::SetEnabled(enabled))
    }

    pub fn get_score(&mut self) -> Result<ScoreReport> {
        self.exchange(Command::GetScore, |r| match r {
            Response::Score(score) => Some(score),
            _ => None,
        })
    }
}
