//! PiBot Sim entry point
//!
//! Serves a kinematic arena session over stdio: one JSON command per input
//! line, one JSON response per output line. Stops after `Teardown`; end of
//! input tears the session down.
//!
//! Usage: `pibot-sim [config.json]`

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

use pibot_sim::remote::{decode_command, encode_response};
use pibot_sim::{Command, KinematicWorld, Response, SimClient, SimConfig};

fn main() -> ExitCode {
    env_logger::init();
    log::info!("PiBot Sim starting...");

    let config = match std::env::args().nth(1) {
        Some(path) => match SimConfig::load(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => SimConfig::headless(),
    };

    let mut client = match SimClient::start(config, KinematicWorld::arena()) {
        Ok(client) => client,
        Err(e) => {
            log::error!("Setup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut ended = false;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to read command: {e}");
                break;
            }
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let (response, teardown) = match decode_command(text) {
            Ok(command) => {
                if command == Command::Teardown {
                    let response = client.end().map_or_else(Response::Error, Response::Ack);
                    (response, true)
                } else {
                    (client.send(command).unwrap_or_else(Response::Error), false)
                }
            }
            Err(e) => {
                log::warn!("Bad command line: {e}");
                (Response::Error(e), false)
            }
        };

        let json = encode_response(&response).unwrap_or_else(|e| {
            encode_response(&Response::Error(e)).unwrap_or_default()
        });
        if let Err(e) = writeln!(stdout, "{json}").and_then(|_| stdout.flush()) {
            log::error!("Failed to write response: {e}");
            break;
        }

        if teardown {
            ended = true;
            break;
        }
    }

    if !ended {
        if let Err(e) = client.end() {
            log::warn!("Teardown at end of input failed: {e}");
        }
    }
    log::info!("PiBot Sim stopped");
    ExitCode::SUCCESS
}
