//! Session recording
//!
//! Files written under the configured log directory:
//! - `states.jsonl`: one [`StepRecord`] per line
//! - `frames/frame_NNNNNNNN.ppm`: a frame every `FRAME_RECORD_INTERVAL` steps
//! - `final_state.json`: world snapshot saved at teardown
//!
//! Opening the directory is a setup error. Later write failures are logged
//! and switch the affected stream off instead of stopping the session.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::FRAME_RECORD_INTERVAL;
use crate::error::{Result, SimError};
use crate::sim::ScoreReport;
use crate::world::{Frame, Pose};

pub const STATES_FILE: &str = "states.jsonl";
pub const FRAMES_DIR: &str = "frames";
pub const FINAL_STATE_FILE: &str = "final_state.json";

/// One line of the state log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u64,
    pub time: f64,
    pub enabled: bool,
    pub pose: Pose,
    pub score: ScoreReport,
}

#[derive(Debug)]
pub struct Recorder {
    dir: PathBuf,
    states: Option<BufWriter<File>>,
    frames_dir: Option<PathBuf>,
}

fn open_error(path: &Path, e: std::io::Error) -> SimError {
    SimError::InvalidConfig(format!("cannot record to {}: {e}", path.display()))
}

impl Recorder {
    pub fn open(dir: &Path, log_states: bool, record_frames: bool) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| open_error(dir, e))?;

        let states = if log_states {
            let path = dir.join(STATES_FILE);
            let file = File::create(&path).map_err(|e| open_error(&path, e))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        let frames_dir = if record_frames {
            let path = dir.join(FRAMES_DIR);
            fs::create_dir_all(&path).map_err(|e| open_error(&path, e))?;
            Some(path)
        } else {
            None
        };

        log::info!(
            "Recording to {} (states: {log_states}, frames: {record_frames})",
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            states,
            frames_dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn logs_states(&self) -> bool {
        self.states.is_some()
    }

    pub fn wants_frame(&self, step: u64) -> bool {
        self.frames_dir.is_some() && step % FRAME_RECORD_INTERVAL == 0
    }

    pub fn final_state_path(&self) -> PathBuf {
        self.dir.join(FINAL_STATE_FILE)
    }

    pub fn record_step(&mut self, record: &StepRecord) {
        let Some(out) = self.states.as_mut() else {
            return;
        };
        let written = serde_json::to_string(record)
            .map_err(std::io::Error::other)
            .and_then(|line| writeln!(out, "{line}"));
        if let Err(e) = written {
            log::warn!("State log disabled: {e}");
            self.states = None;
        }
    }

    pub fn record_frame(&mut self, step: u64, frame: &Frame) {
        let Some(dir) = self.frames_dir.as_ref() else {
            return;
        };
        let path = dir.join(format!("frame_{step:08}.ppm"));
        let written = File::create(&path).and_then(|file| {
            let mut out = BufWriter::new(file);
            frame.write_ppm(&mut out)?;
            out.flush()
        });
        if let Err(e) = written {
            log::warn!("Frame recording disabled ({}): {e}", path.display());
            self.frames_dir = None;
        }
    }

    pub fn flush(&mut self) {
        if let Some(out) = self.states.as_mut() {
            if let Err(e) = out.flush() {
                log::warn!("Failed to flush state log: {e}");
            }
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SequenceScore;
    use crate::world::frame::colors;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pibot-rec-{name}-{}", std::process::id()))
    }

    #[test]
    fn test_states_are_json_lines() {
        let dir = temp_dir("states");
        let mut recorder = Recorder::open(&dir, true, false).unwrap();
        assert!(recorder.logs_states());
        assert!(!recorder.wants_frame(0));

        for step in 1..=3 {
            recorder.record_step(&StepRecord {
                step,
                time: step as f64 * 0.5,
                enabled: step > 1,
                pose: Pose::new(0.1 * step as f32, 0.0, 0.0),
                score: SequenceScore::default().into(),
            });
        }
        recorder.flush();

        let text = fs::read_to_string(dir.join(STATES_FILE)).unwrap();
        let records: Vec<StepRecord> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].step, 3);
        assert_eq!(records[2].time, 1.5);
        assert!(!records[0].enabled);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_frames_written_on_interval() {
        let dir = temp_dir("frames");
        let mut recorder = Recorder::open(&dir, false, true).unwrap();
        assert!(!recorder.logs_states());
        assert!(recorder.wants_frame(0));
        assert!(!recorder.wants_frame(FRAME_RECORD_INTERVAL - 1));
        assert!(recorder.wants_frame(FRAME_RECORD_INTERVAL * 3));

        recorder.record_frame(16, &Frame::new(2, 2, colors::SKY));
        let ppm = fs::read(dir.join(FRAMES_DIR).join("frame_00000016.ppm")).unwrap();
        assert!(ppm.starts_with(b"P6\n2 2\n255\n"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unwritable_dir_is_config_error() {
        let dir = temp_dir("blocked");
        fs::create_dir_all(dir.parent().unwrap()).unwrap();
        fs::write(&dir, "not a directory").unwrap();
        assert!(matches!(
            Recorder::open(&dir, true, false),
            Err(SimError::InvalidConfig(_))
        ));
        fs::remove_file(&dir).ok();
    }
}
