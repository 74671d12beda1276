//! Sequence scoring
//!
//! Presses are matched against a fixed digit sequence (the digits of π).
//! Ten points per digit pressed in order; once the sequence is broken every
//! further press is worth one point, capped at 100.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::buttons::ButtonEvents;
use crate::consts::{MAX_EXTRA_POINTS, POINTS_PER_DIGIT};
use crate::error::{Result, SimError};

/// First 2000 digits of π
pub const PI_DIGITS: &str = concat!(
    "31415926535897932384626433832795028841971693993751",
    "05820974944592307816406286208998628034825342117067",
    "98214808651328230664709384460955058223172535940812",
    "84811174502841027019385211055596446229489549303819",
    "64428810975665933446128475648233786783165271201909",
    "14564856692346034861045432664821339360726024914127",
    "37245870066063155881748815209209628292540917153643",
    "67892590360011330530548820466521384146951941511609",
    "43305727036575959195309218611738193261179310511854",
    "80744623799627495673518857527248912279381830119491",
    "29833673362440656643086021394946395224737190702179",
    "86094370277053921717629317675238467481846766940513",
    "20005681271452635608277857713427577896091736371787",
    "21468440901224953430146549585371050792279689258923",
    "54201995611212902196086403441815981362977477130996",
    "05187072113499999983729780499510597317328160963185",
    "95024459455346908302642522308253344685035261931188",
    "17101000313783875288658753320838142061717766914730",
    "35982534904287554687311595628638823537875937519577",
    "81857780532171226806613001927876611195909216420198",
    "93809525720106548586327886593615338182796823030195",
    "20353018529689957736225994138912497217752834791315",
    "15574857242454150695950829533116861727855889075098",
    "38175463746493931925506040092770167113900984882401",
    "28583616035637076601047101819429555961989467678374",
    "49448255379774726847104047534646208046684259069491",
    "29331367702898915210475216205696602405803815019351",
    "12533824300355876402474964732639141992726042699227",
    "96782354781636009341721641219924586315030286182974",
    "55570674983850549458858692699569092721079750930295",
    "53211653449872027559602364806654991198818347977535",
    "66369807426542527862551818417574672890977772793800",
    "08164706001614524919217321721477235014144197356854",
    "81613611573525521334757418494684385233239073941433",
    "34547762416862518983569485562099219222184272550254",
    "25688767179049460165346680498862723279178608578438",
    "38279679766814541009538837863609506800642251252051",
    "17392984896084128488626945604241965285022210661186",
    "30674427862203919494504712371378696095636437191728",
    "74677646575739624138908658326459958133904780275900",
);

/// Immutable digit sequence, cheap to share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSequence {
    digits: Arc<[u8]>,
}

impl TargetSequence {
    /// The digits of π used by the arena
    pub fn pi() -> Self {
        Self {
            digits: PI_DIGITS.bytes().map(|b| b - b'0').collect(),
        }
    }

    /// Parse a string of decimal digits
    pub fn from_digits(digits: &str) -> Result<Self> {
        let digits = digits
            .chars()
            .map(|c| {
                c.to_digit(10)
                    .map(|d| d as u8)
                    .ok_or_else(|| SimError::InvalidConfig(format!("`{c}` is not a digit")))
            })
            .collect::<Result<Arc<[u8]>>>()?;
        Ok(Self { digits })
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<u8> {
        self.digits.get(position).copied()
    }

    pub fn digits(&self) -> &[u8] {
        &self.digits
    }
}

/// Running tally kept by the scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceScore {
    pub in_sequence: bool,
    pub num_sequenced: u32,
    pub extra_not_sequenced: u32,
}

impl Default for SequenceScore {
    fn default() -> Self {
        Self {
            in_sequence: true,
            num_sequenced: 0,
            extra_not_sequenced: 0,
        }
    }
}

impl SequenceScore {
    pub fn score(&self) -> u32 {
        POINTS_PER_DIGIT * self.num_sequenced + self.extra_not_sequenced.min(MAX_EXTRA_POINTS)
    }
}

/// Score as reported to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub score: u32,
    pub num_sequenced: u32,
    pub extra_not_sequenced: u32,
    pub in_sequence: bool,
}

impl From<SequenceScore> for ScoreReport {
    fn from(s: SequenceScore) -> Self {
        Self {
            score: s.score(),
            num_sequenced: s.num_sequenced,
            extra_not_sequenced: s.extra_not_sequenced,
            in_sequence: s.in_sequence,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SequenceScorer {
    target: TargetSequence,
    score: SequenceScore,
}

impl SequenceScorer {
    pub fn new(target: TargetSequence) -> Self {
        Self {
            target,
            score: SequenceScore::default(),
        }
    }

    pub fn target(&self) -> &TargetSequence {
        &self.target
    }

    pub fn score(&self) -> SequenceScore {
        self.score
    }

    pub fn reset(&mut self) {
        self.score = SequenceScore::default();
    }

    /// Apply the outcome of one debounce update.
    ///
    /// The first press that breaks the sequence is not counted as an extra
    /// press; only presses made after the break are. Holding more than one
    /// button at once always breaks the sequence.
    pub fn on_tick(&mut self, events: &ButtonEvents) {
        let held = events.num_held();
        let s = &mut self.score;

        if held == 0 {
            return;
        }

        if s.in_sequence {
            if held > 1 {
                s.in_sequence = false;
            } else if events.any_press() {
                // A finished sequence has no next digit, so any press breaks it
                let expected = self.target.get(s.num_sequenced as usize);
                match expected {
                    Some(digit) if events.is_held(digit as usize) => s.num_sequenced += 1,
                    _ => s.in_sequence = false,
                }
            }
        } else if events.any_press() {
            s.extra_not_sequenced += 1;
        }
    }
}
