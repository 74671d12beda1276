//! Command/response messages
//!
//! Every command gets exactly one response. Failures are reported in-band as
//! [`Response::Error`] so the controller never loses track of the exchange.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::sim::{ScoreReport, WheelVelocities};
use crate::world::{Frame, Pose};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Restore the post-setup state
    Reset,
    /// Close the session and stop the server loop
    Teardown,
    /// Grant this many steps of credit (replaces any unused credit)
    AdvanceSteps(u32),
    /// Answer once the step credit has been used up
    Sync,
    GetTime,
    SetTime(f64),
    GetPose,
    SetPose(Pose),
    GetImage,
    GetWheelVelocities,
    SetWheelVelocities { left: f32, right: f32 },
    GetEnabled,
    SetEnabled(bool),
    GetScore,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Reset => "Reset",
            Command::Teardown => "Teardown",
            Command::AdvanceSteps(_) => "AdvanceSteps",
            Command::Sync => "Sync",
            Command::GetTime => "GetTime",
            Command::SetTime(_) => "SetTime",
            Command::GetPose => "GetPose",
            Command::SetPose(_) => "SetPose",
            Command::GetImage => "GetImage",
            Command::GetWheelVelocities => "GetWheelVelocities",
            Command::SetWheelVelocities { .. } => "SetWheelVelocities",
            Command::GetEnabled => "GetEnabled",
            Command::SetEnabled(_) => "SetEnabled",
            Command::GetScore => "GetScore",
        }
    }

    /// Reject arguments the session cannot act on
    pub fn validate(&self) -> Result<()> {
        let ok = match self {
            Command::SetTime(t) => t.is_finite() && *t >= 0.0,
            Command::SetPose(pose) => pose.is_finite(),
            Command::SetWheelVelocities { left, right } => left.is_finite() && right.is_finite(),
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::ProtocolViolation(format!(
                "invalid argument for {}",
                self.name()
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Ack(bool),
    Time(f64),
    Pose(Pose),
    Image(Frame),
    WheelVelocities(WheelVelocities),
    Enabled(bool),
    Score(ScoreReport),
    Error(SimError),
}

/// Parse one JSON-encoded command
pub fn decode_command(text: &str) -> Result<Command> {
    serde_json::from_str(text).map_err(|e| SimError::ProtocolViolation(e.to_string()))
}

/// JSON-encode a response
pub fn encode_response(response: &Response) -> Result<String> {
    serde_json::to_string(response).map_err(|e| SimError::ProtocolViolation(e.to_string()))
}
