//! Horde characteristics: walk speed and event sensitivity.
//!
//! Each kind contributes its own characteristics; a horde holding clusters of
//! several kinds carries the merge of all of them. Walk speeds are averaged,
//! sensitivity keeps the maximum.

use serde::{Deserialize, Serialize};

use crate::config::FeralSense;

/// Abstract walk speed in blocks per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkSpeed {
    pub day: f32,
    pub night: f32,
}

impl WalkSpeed {
    pub fn new(day: f32, night: f32) -> Self {
        Self { day, night }
    }

    pub fn at(&self, is_daytime: bool) -> f32 {
        if is_daytime {
            self.day
        } else {
            self.night
        }
    }

    fn merge(&mut self, other: &WalkSpeed) {
        self.day = (self.day + other.day) / 2.0;
        self.night = (self.night + other.night) / 2.0;
    }
}

/// Multiplier on world-event report distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sensitivity(pub f32);

/// The merged characteristic set of one horde.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HordeCharacteristics {
    pub walk_speed: Option<WalkSpeed>,
    pub sensitivity: Option<Sensitivity>,
}

impl HordeCharacteristics {
    /// Walk speed used when no kind specified one.
    pub const DEFAULT_WALK_SPEED: f32 = 1.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_walk_speed(mut self, day: f32, night: f32) -> Self {
        self.walk_speed = Some(WalkSpeed::new(day, night));
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.sensitivity = Some(Sensitivity(sensitivity));
        self
    }

    /// Fold `other` into `self`. Characteristics only one side has are copied.
    pub fn merge(&mut self, other: &HordeCharacteristics) {
        self.walk_speed = match (self.walk_speed, other.walk_speed) {
            (Some(mut mine), Some(theirs)) => {
                mine.merge(&theirs);
                Some(mine)
            }
            (mine, theirs) => mine.or(theirs),
        };
        self.sensitivity = match (self.sensitivity, other.sensitivity) {
            (Some(mine), Some(theirs)) => Some(Sensitivity(mine.0.max(theirs.0))),
            (mine, theirs) => mine.or(theirs),
        };
    }

    pub fn walk_speed(&self, is_daytime: bool) -> f32 {
        self.walk_speed
            .map_or(Self::DEFAULT_WALK_SPEED, |w| w.at(is_daytime))
    }

    /// Effective sensitivity, boosted while feral sense is active. `None`
    /// when the horde does not react to world events at all.
    pub fn sensitivity(&self, feral: FeralSense, multiplier: f32, is_daytime: bool) -> Option<f32> {
        let base = self.sensitivity?.0;
        Some(if feral.is_active(is_daytime) {
            base * multiplier
        } else {
            base
        })
    }
}
