use records::Batch;

use crate::track::Advance;
use crate::{Control, MapSurface, PlaybackConfig, PlaybackControls, SegmentID, SegmentStyle, Track};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Running,
    Paused,
}

/// Replays recent history of several devices at once, moving a tracker along straight segments
/// between their recorded positions.
///
/// The animator doesn't own a clock. Whoever drives it calls `tick` every `tick_interval`, for as
/// long as `tick_scheduled` says one is pending.
pub struct Animator<M: MapSurface, C: PlaybackControls> {
    config: PlaybackConfig,
    style: SegmentStyle,
    surface: M,
    controls: C,
    on_stop: Box<dyn FnMut()>,

    state: PlaybackState,
    tracks: Vec<Track>,
    // Every segment drawn this session, including the ones already traversed
    segments: Vec<SegmentID>,
    num_completed: usize,
    tick_scheduled: bool,
}

impl<M: MapSurface, C: PlaybackControls> Animator<M, C> {
    pub fn new(config: PlaybackConfig, surface: M, mut controls: C, on_stop: Box<dyn FnMut()>) -> Self {
        controls.set_enabled(Control::Play, true);
        controls.set_enabled(Control::Pause, false);
        controls.set_enabled(Control::Stop, false);

        Self {
            style: config.segment_style(),
            config,
            surface,
            controls,
            on_stop,

            state: PlaybackState::Stopped,
            tracks: Vec::new(),
            segments: Vec::new(),
            num_completed: 0,
            tick_scheduled: false,
        }
    }

    /// Starts a new session with one batch per device, or resumes a paused one. When resuming,
    /// `batches` is ignored. Does nothing while already playing.
    pub fn play(&mut self, batches: Vec<Batch>) {
        match self.state {
            PlaybackState::Running => {
                return;
            }
            PlaybackState::Stopped => {
                self.start_session(batches);
            }
            PlaybackState::Paused => {
                if !batches.is_empty() {
                    debug!("Resuming playback; ignoring {} new batches", batches.len());
                }
            }
        }

        self.state = PlaybackState::Running;
        self.controls.set_enabled(Control::Play, false);
        self.controls.set_enabled(Control::Pause, true);
        self.controls.set_enabled(Control::Stop, true);
        self.tick_scheduled = true;
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Running {
            return;
        }
        self.tick_scheduled = false;
        self.state = PlaybackState::Paused;

        self.controls.set_enabled(Control::Play, true);
        self.controls.set_enabled(Control::Pause, false);
        self.controls.set_enabled(Control::Stop, true);
    }

    /// Ends the session, erasing everything it drew, and calls the stop handler.
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Stopped {
            return;
        }
        self.tick_scheduled = false;
        self.state = PlaybackState::Stopped;

        self.controls.set_enabled(Control::Play, true);
        self.controls.set_enabled(Control::Pause, false);
        self.controls.set_enabled(Control::Stop, false);

        for segment in self.segments.drain(..) {
            self.surface.remove_segment(segment);
        }
        self.tracks.clear();
        self.num_completed = 0;
        info!("Playback stopped");

        (self.on_stop)();
    }

    /// True while running or paused
    pub fn is_playing(&self) -> bool {
        self.state != PlaybackState::Stopped
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Whether `tick` should be called again after `tick_interval`
    pub fn tick_scheduled(&self) -> bool {
        self.tick_scheduled
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        self.config.tick_interval()
    }

    /// Moves every unfinished tracker one step. Ticks that arrive when none is scheduled, like
    /// one racing a pause, are ignored.
    pub fn tick(&mut self) {
        if self.state != PlaybackState::Running || !self.tick_scheduled {
            debug!("Ignoring unscheduled tick while {:?}", self.state);
            return;
        }

        for track in &mut self.tracks {
            if track.is_completed() {
                continue;
            }
            match track.advance(self.config.step_percent, &mut self.surface, &self.style) {
                Advance::Moved => {}
                Advance::NewSegment(segment) => {
                    self.segments.push(segment);
                }
                Advance::Finished => {
                    self.num_completed += 1;
                }
            }
        }

        self.tick_scheduled = self.num_completed < self.tracks.len();
        if !self.tick_scheduled {
            info!("All {} tracks reached their final point", self.tracks.len());
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn num_completed(&self) -> usize {
        self.num_completed
    }

    pub fn surface(&self) -> &M {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut M {
        &mut self.surface
    }

    pub fn controls(&self) -> &C {
        &self.controls
    }

    fn start_session(&mut self, batches: Vec<Batch>) {
        self.tracks.clear();
        self.segments.clear();
        self.num_completed = 0;

        for batch in batches {
            let track = Track::start(batch, &mut self.surface, &self.style);
            match track.segment() {
                Some(segment) => {
                    self.segments.push(segment);
                }
                None => {
                    self.num_completed += 1;
                }
            }
            self.tracks.push(track);
        }

        info!(
            "Starting playback of {} tracks, {} of them without enough points to move",
            self.tracks.len(),
            self.num_completed
        );
    }
}
