#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Control {
    Play,
    Pause,
    Stop,
}

impl Control {
    pub fn all() -> Vec<Self> {
        vec![Control::Play, Control::Pause, Control::Stop]
    }
}

/// The play/pause/stop affordances. Playback only tells them whether they can be used; clicks
/// are wired up by whoever owns them.
pub trait PlaybackControls {
    fn set_enabled(&mut self, control: Control, enabled: bool);
}
