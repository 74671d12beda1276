//! Button wall debouncing
//!
//! Mirrors the arena controller firmware: a raw reading is only accepted once
//! it has stayed unchanged for strictly longer than the debounce delay. Any
//! raw change (noise or a real press) restarts the window.

use serde::{Deserialize, Serialize};

use crate::consts::MAX_BUTTONS;
use crate::error::{Result, SimError};

/// Debounce bookkeeping for one physical button
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ButtonState {
    /// Latest raw reading
    pub reading: bool,
    /// Accepted state after debouncing
    pub debounced: bool,
    /// Raw reading seen by the previous update
    pub last_reading: bool,
    /// Filter time of the last raw reading change (seconds)
    pub last_transition_time: f64,
}

/// Result of one debounce update, bit `i` standing for button `i`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonEvents {
    presses: u64,
    held: u64,
}

impl ButtonEvents {
    /// Build from raw bitmasks
    pub const fn from_bits(presses: u64, held: u64) -> Self {
        Self { presses, held }
    }

    /// Button committed to pressed during this update
    pub fn pressed_now(&self, button: usize) -> bool {
        button < MAX_BUTTONS && self.presses & (1 << button) != 0
    }

    pub fn any_press(&self) -> bool {
        self.presses != 0
    }

    /// Button is in the debounced pressed state after this update
    pub fn is_held(&self, button: usize) -> bool {
        button < MAX_BUTTONS && self.held & (1 << button) != 0
    }

    pub fn num_held(&self) -> u32 {
        self.held.count_ones()
    }

    /// Indices of buttons that committed to pressed during this update
    pub fn presses(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_BUTTONS).filter(|&i| self.pressed_now(i))
    }
}

/// Debounce filter over every button on the wall
#[derive(Debug, Clone)]
pub struct ButtonBank {
    buttons: Vec<ButtonState>,
    debounce_delay: f64,
    /// Filter time, advanced only by `update`
    time: f64,
}

impl ButtonBank {
    pub fn new(num_buttons: usize, debounce_delay: f64) -> Result<Self> {
        if num_buttons > MAX_BUTTONS {
            return Err(SimError::InvalidConfig(format!(
                "{num_buttons} buttons exceeds the limit of {MAX_BUTTONS}"
            )));
        }
        if !debounce_delay.is_finite() || debounce_delay < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "debounce delay must be finite and non-negative, got {debounce_delay}"
            )));
        }
        Ok(Self {
            buttons: vec![ButtonState::default(); num_buttons],
            debounce_delay,
            time: 0.0,
        })
    }

    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn debounce_delay(&self) -> f64 {
        self.debounce_delay
    }

    pub fn status(&self, button: usize) -> Result<&ButtonState> {
        self.buttons
            .get(button)
            .ok_or_else(|| SimError::out_of_range("button", button, self.buttons.len()))
    }

    pub fn states(&self) -> &[ButtonState] {
        &self.buttons
    }

    /// Change the raw reading without running the filter
    pub fn set_reading(&mut self, button: usize, reading: bool) -> Result<()> {
        let len = self.buttons.len();
        let state = self
            .buttons
            .get_mut(button)
            .ok_or_else(|| SimError::out_of_range("button", button, len))?;
        state.reading = reading;
        Ok(())
    }

    /// Raw press followed by a zero-time update, as if continuously polled
    pub fn press(&mut self, button: usize) -> Result<ButtonEvents> {
        self.set_reading(button, true)?;
        Ok(self.update(0.0))
    }

    /// Raw release followed by a zero-time update
    pub fn release(&mut self, button: usize) -> Result<ButtonEvents> {
        self.set_reading(button, false)?;
        Ok(self.update(0.0))
    }

    /// Advance the filter by `dt` seconds.
    ///
    /// Commits at most one transition per button per call, however large
    /// `dt` is.
    pub fn update(&mut self, dt: f64) -> ButtonEvents {
        self.time += dt;
        let mut events = ButtonEvents::default();

        for (i, b) in self.buttons.iter_mut().enumerate() {
            if b.reading != b.last_reading {
                b.last_transition_time = self.time;
            }
            // Strictly greater: a reading held for exactly the delay is not accepted
            if self.time - b.last_transition_time > self.debounce_delay && b.reading != b.debounced
            {
                b.debounced = b.reading;
                if b.debounced {
                    events.presses |= 1 << i;
                }
            }
            if b.debounced {
                events.held |= 1 << i;
            }
            b.last_reading = b.reading;
        }

        events
    }

    /// Back to the power-on state: all released, filter time zero
    pub fn reset(&mut self) {
        self.buttons.fill(ButtonState::default());
        self.time = 0.0;
    }
}
