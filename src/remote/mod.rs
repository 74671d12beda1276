//! Remote control of a running session
//!
//! The controller and the server loop exchange [`Command`]s and
//! [`Response`]s over a pair of channels, one request in flight at a time.
//! [`SimClient`] is the controller-side facade; [`SimServer`] owns the
//! session on its own thread.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::SimClient;
pub use protocol::{Command, Response, decode_command, encode_response};
pub use server::{LoopControl, SimServer};
