use std::collections::BTreeMap;

use playback::{Control, PlaybackControls};

/// The play, pause and stop buttons. A button that can't be used is drawn faded.
pub struct ControlPanel {
    disabled_opacity: f64,
    opacity: BTreeMap<Control, f64>,
}

impl ControlPanel {
    pub fn new(disabled_opacity: f64) -> Self {
        Self {
            disabled_opacity,
            opacity: Control::all().into_iter().map(|c| (c, 1.0)).collect(),
        }
    }

    pub fn opacity(&self, control: Control) -> f64 {
        self.opacity[&control]
    }

    pub fn is_enabled(&self, control: Control) -> bool {
        self.opacity(control) == 1.0
    }
}

impl PlaybackControls for ControlPanel {
    fn set_enabled(&mut self, control: Control, enabled: bool) {
        let opacity = if enabled { 1.0 } else { self.disabled_opacity };
        if self.opacity.insert(control, opacity) != Some(opacity) {
            debug!("{:?} button now has opacity {}", control, opacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fades_disabled_buttons() {
        let mut panel = ControlPanel::new(0.5);
        assert!(panel.is_enabled(Control::Pause));

        panel.set_enabled(Control::Pause, false);
        assert_eq!(panel.opacity(Control::Pause), 0.5);
        assert!(!panel.is_enabled(Control::Pause));
        assert!(panel.is_enabled(Control::Play));

        panel.set_enabled(Control::Pause, true);
        assert_eq!(panel.opacity(Control::Pause), 1.0);
    }
}
