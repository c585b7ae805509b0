#[macro_use]
extern crate log;

mod animator;
mod controls;
mod surface;
mod track;

use serde::{Deserialize, Serialize};

pub use animator::{Animator, PlaybackState};
pub use controls::{Control, PlaybackControls};
pub use surface::{MapSurface, SegmentID, SegmentStyle};
pub use track::{Track, Tracker};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// How far along the current segment a tracker moves each tick, in percent
    pub step_percent: u32,
    pub tick_interval_ms: u64,
    pub line_color: String,
    pub tracker_color: String,
    /// Opacity of a control that can't currently be used
    pub disabled_opacity: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            step_percent: 5,
            tick_interval_ms: 100,
            line_color: "#444".to_string(),
            tracker_color: "#00f".to_string(),
            disabled_opacity: 0.5,
        }
    }
}

impl PlaybackConfig {
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }

    pub fn segment_style(&self) -> SegmentStyle {
        SegmentStyle {
            line_color: self.line_color.clone(),
            tracker_color: self.tracker_color.clone(),
        }
    }
}
