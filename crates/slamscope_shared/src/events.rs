//! Observation event flags.
//!
//! The estimation loop raises these per observation edge each step; the
//! display side accumulates them per landmark to pick a color. Flags are
//! a snapshot of "what happened to this landmark this step", not a log.

use serde::{Deserialize, Serialize};

/// Event flags accumulated on an observation edge during one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObsEvents {
    /// The landmark was predicted into the sensor frame.
    pub predicted: bool,
    /// The prediction fell inside the sensor's field of view.
    pub visible: bool,
    /// A measurement was attempted.
    pub measured: bool,
    /// The measurement matched the prediction.
    pub matched: bool,
    /// The filter update was applied.
    pub updated: bool,
}

impl ObsEvents {
    /// No events raised.
    pub const NONE: Self = Self {
        predicted: false,
        visible: false,
        measured: false,
        matched: false,
        updated: false,
    };

    /// Unions another flag set into this one.
    ///
    /// A landmark observed by several sensors shows the strongest thing
    /// that happened to it anywhere.
    pub fn merge(&mut self, other: Self) {
        self.predicted |= other.predicted;
        self.visible |= other.visible;
        self.measured |= other.measured;
        self.matched |= other.matched;
        self.updated |= other.updated;
    }

    /// True if any flag is raised.
    #[must_use]
    pub fn any(self) -> bool {
        self.predicted || self.visible || self.measured || self.matched || self.updated
    }
}
