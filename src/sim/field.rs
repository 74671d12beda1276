//! The arena field: button wall plus its scoring
//!
//! Button joint positions are read from the engine every step. A change in a
//! raw reading is applied immediately with a zero-time debounce update, the
//! way the firmware would see it while polling continuously.

use super::buttons::{ButtonBank, ButtonEvents};
use super::scoring::{SequenceScore, SequenceScorer, TargetSequence};
use crate::consts::BUTTON_PRESS_DEPTH;
use crate::error::Result;
use crate::world::{BodyId, JointId, PhysicsWorld, WorldLayout};

#[derive(Debug, Clone)]
pub struct Field {
    body: BodyId,
    button_joints: Vec<JointId>,
    buttons: ButtonBank,
    scorer: SequenceScorer,
}

impl Field {
    pub fn new(layout: &WorldLayout, debounce_delay: f64, target: TargetSequence) -> Result<Self> {
        Ok(Self {
            body: layout.field,
            button_joints: layout.buttons.clone(),
            buttons: ButtonBank::new(layout.buttons.len(), debounce_delay)?,
            scorer: SequenceScorer::new(target),
        })
    }

    pub fn buttons(&self) -> &ButtonBank {
        &self.buttons
    }

    pub fn score(&self) -> SequenceScore {
        self.scorer.score()
    }

    pub fn target(&self) -> &TargetSequence {
        self.scorer.target()
    }

    fn apply(&mut self, events: ButtonEvents) {
        self.scorer.on_tick(&events);
    }

    pub fn press_button(&mut self, button: usize) -> Result<()> {
        let events = self.buttons.press(button)?;
        self.apply(events);
        Ok(())
    }

    pub fn release_button(&mut self, button: usize) -> Result<()> {
        let events = self.buttons.release(button)?;
        self.apply(events);
        Ok(())
    }

    /// Regular per-step debounce and scoring pass
    pub fn update(&mut self, dt: f64) {
        let events = self.buttons.update(dt);
        self.apply(events);
    }

    /// Read the button joints and feed any reading change to the filter
    pub fn monitor<W: PhysicsWorld + ?Sized>(&mut self, world: &W) -> Result<()> {
        for button in 0..self.button_joints.len() {
            let joint = world.joint_state(self.body, self.button_joints[button])?;
            let pressed = joint.position < BUTTON_PRESS_DEPTH;
            if pressed == self.buttons.status(button)?.reading {
                continue;
            }
            log::debug!("Button {button} {}", if pressed { "down" } else { "up" });
            if pressed {
                self.press_button(button)?;
            } else {
                self.release_button(button)?;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.buttons.reset();
        self.scorer.reset();
    }
}
