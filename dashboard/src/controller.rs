use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use anyhow::Result;
use futures::StreamExt;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use playback::Animator;
use records::{Batch, DeviceID, LiveMessage};

use crate::{ControlPanel, DashboardConfig, HistorySource, LiveClient, TrailMap};

/// Everything the dashboard reacts to, delivered one at a time over a single channel.
#[derive(Debug)]
pub enum Event {
    Live(LiveMessage),
    /// The live server went away, with the error if there was one
    TransportClosed(Option<String>),
    History {
        request: usize,
        idx: usize,
        result: Result<Batch>,
    },
    Command(Command),
}

/// What the operator asks for.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Show(DeviceID),
    Hide(DeviceID),
    /// Replay recent history of these devices, or resume a paused replay
    Play(Vec<DeviceID>),
    Pause,
    Stop,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExitWhen {
    Shutdown,
    PlaybackFinished,
    TransportClosed,
}

struct PendingPlayback {
    request: usize,
    devices: Vec<DeviceID>,
    batches: Vec<Option<Batch>>,
}

pub struct Dashboard {
    config: DashboardConfig,
    history: HistorySource,
    animator: Animator<TrailMap, ControlPanel>,
    live: Option<LiveClient>,

    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
    next_tick: Instant,

    pending: Option<PendingPlayback>,
    num_requests: usize,
    // Which devices were visible before playback hid them all
    saved_visibility: Option<BTreeSet<DeviceID>>,
    // Set by the animator's stop handler, cleared once visibility is restored
    stopped: Rc<Cell<bool>>,

    exit_when: ExitWhen,
    output: Option<String>,
}

impl Dashboard {
    pub fn new(config: DashboardConfig, history: HistorySource) -> Self {
        let (events_tx, events_rx) = unbounded();

        let stopped = Rc::new(Cell::new(false));
        let on_stop = {
            let stopped = stopped.clone();
            Box::new(move || stopped.set(true))
        };
        let animator = Animator::new(
            config.playback.clone(),
            TrailMap::new(),
            ControlPanel::new(config.playback.disabled_opacity),
            on_stop,
        );

        Self {
            config,
            history,
            animator,
            live: None,

            events_tx,
            events_rx,
            next_tick: Instant::now(),

            pending: None,
            num_requests: 0,
            saved_visibility: None,
            stopped,

            exit_when: ExitWhen::Shutdown,
            output: None,
        }
    }

    /// When `run` should return. If `output` is set, the map is exported there first.
    pub fn exit_when(&mut self, exit_when: ExitWhen, output: Option<String>) {
        self.exit_when = exit_when;
        self.output = output;
    }

    pub fn connect_live(&mut self) {
        let live = self.live.get_or_insert_with(|| {
            LiveClient::new(self.config.transport.clone(), self.events_tx.clone())
        });
        info!("Connecting to {}", live.url());
        live.connect();
    }

    pub fn send(&self, cmd: Command) {
        let _ = self.events_tx.unbounded_send(Event::Command(cmd));
    }

    /// For sending events from elsewhere
    pub fn sender(&self) -> UnboundedSender<Event> {
        self.events_tx.clone()
    }

    pub fn map(&self) -> &TrailMap {
        self.animator.surface()
    }

    pub fn animator(&self) -> &Animator<TrailMap, ControlPanel> {
        &self.animator
    }

    pub async fn run(mut self) -> Result<()> {
        while self.step().await? {}

        if let Some(ref path) = self.output {
            self.animator.surface().export_geojson(path)?;
        }
        self.stop_playback();
        Ok(())
    }

    /// Handles the next event or animation tick, whichever comes first. False means it's time to
    /// exit.
    pub async fn step(&mut self) -> Result<bool> {
        let tick_scheduled = self.animator.tick_scheduled();
        tokio::select! {
            event = self.events_rx.next() => match event {
                Some(event) => self.handle(event),
                None => Ok(false),
            },
            _ = tokio::time::sleep_until(self.next_tick), if tick_scheduled => {
                Ok(self.tick())
            }
        }
    }

    fn tick(&mut self) -> bool {
        self.animator.tick();
        // Measured from the end of this tick, not the start
        self.next_tick = Instant::now() + self.animator.tick_interval();
        !(self.exit_when == ExitWhen::PlaybackFinished && !self.animator.tick_scheduled())
    }

    pub fn handle(&mut self, event: Event) -> Result<bool> {
        match event {
            Event::Live(LiveMessage::Position(rec)) => {
                let device = rec.device.clone();
                let is_new = !self.map().devices().contains_key(&device);
                self.animator.surface_mut().update_position(rec);
                if is_new {
                    info!("New device {}", device);
                    if let Some(ref mut saved) = self.saved_visibility {
                        saved.insert(device.clone());
                        self.animator.surface_mut().set_visible(&device, false);
                    }
                }
            }
            Event::Live(LiveMessage::Presence { device, connected }) => {
                info!(
                    "{} {}",
                    device,
                    if connected { "connected" } else { "disconnected" }
                );
                self.animator
                    .surface_mut()
                    .set_connected(&device, connected);
            }
            Event::TransportClosed(reason) => {
                match reason {
                    Some(err) => warn!("Live transport closed: {}", err),
                    None => info!("Live transport closed"),
                }
                if self.exit_when == ExitWhen::TransportClosed {
                    return Ok(false);
                }
            }
            Event::History {
                request,
                idx,
                result,
            } => {
                self.on_history(request, idx, result);
            }
            Event::Command(cmd) => {
                return Ok(self.on_command(cmd));
            }
        }
        Ok(true)
    }

    fn on_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Show(device) => self.set_visibility(device, true),
            Command::Hide(device) => self.set_visibility(device, false),
            Command::Play(devices) => {
                if self.animator.is_paused() {
                    self.animator.play(Vec::new());
                    self.next_tick = Instant::now();
                } else if self.animator.is_playing() || self.pending.is_some() {
                    debug!("Already playing; ignoring {:?}", devices);
                } else if devices.is_empty() {
                    debug!("No devices to play");
                } else {
                    self.fetch_history(devices);
                }
            }
            Command::Pause => {
                self.animator.pause();
            }
            Command::Stop => {
                if self.pending.take().is_some() {
                    info!("Cancelled loading history");
                }
                self.stop_playback();
            }
            Command::Shutdown => {
                return false;
            }
        }
        true
    }

    fn set_visibility(&mut self, device: DeviceID, visible: bool) {
        // During playback, remember the choice for when it stops
        if let Some(ref mut saved) = self.saved_visibility {
            if visible {
                saved.insert(device);
            } else {
                saved.remove(&device);
            }
            return;
        }
        self.animator.surface_mut().set_visible(&device, visible);
    }

    fn fetch_history(&mut self, devices: Vec<DeviceID>) {
        self.num_requests += 1;
        let request = self.num_requests;
        let count = self.config.history_count;
        info!("Loading {} records each for {} devices", count, devices.len());

        for (idx, device) in devices.iter().enumerate() {
            let history = self.history.clone();
            let events = self.events_tx.clone();
            let device = device.clone();
            tokio::spawn(async move {
                let result = history.recent_history(&device, count).await;
                let _ = events.unbounded_send(Event::History {
                    request,
                    idx,
                    result,
                });
            });
        }

        self.pending = Some(PendingPlayback {
            request,
            batches: devices.iter().map(|_| None).collect(),
            devices,
        });
        self.maybe_start_playback();
    }

    fn on_history(&mut self, request: usize, idx: usize, result: Result<Batch>) {
        let pending = match self.pending {
            Some(ref mut pending) if pending.request == request => pending,
            _ => {
                debug!("Ignoring history from stale request {}", request);
                return;
            }
        };
        let batch = match result {
            Ok(batch) => batch,
            Err(err) => {
                warn!("Couldn't load history of {}: {}", pending.devices[idx], err);
                Vec::new()
            }
        };
        pending.batches[idx] = Some(batch);
        self.maybe_start_playback();
    }

    fn maybe_start_playback(&mut self) {
        if !self
            .pending
            .as_ref()
            .map(|p| p.batches.iter().all(|b| b.is_some()))
            .unwrap_or(false)
        {
            return;
        }
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return,
        };
        let batches: Vec<Batch> = pending.batches.into_iter().flatten().collect();

        // Hide the live view while replaying
        let visible = self.map().visible_devices();
        for device in &visible {
            self.animator.surface_mut().set_visible(device, false);
        }
        self.saved_visibility = Some(visible);

        self.animator.play(batches);
        self.next_tick = Instant::now();
    }

    fn stop_playback(&mut self) {
        self.animator.stop();
        if self.stopped.replace(false) {
            self.restore_visibility();
        }
    }

    fn restore_visibility(&mut self) {
        let saved = match self.saved_visibility.take() {
            Some(saved) => saved,
            None => return,
        };
        let devices: Vec<DeviceID> = self.map().devices().keys().cloned().collect();
        for device in devices {
            let visible = saved.contains(&device);
            self.animator.surface_mut().set_visible(&device, visible);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use playback::Control;
    use records::{CsvHistory, PositionRecord};

    use super::*;

    const HISTORY: &str = "id,timestamp,latitude,longitude
bus,2015-03-14 10:00:00,49.00,-123.0
bus,2015-03-14 10:00:10,49.01,-123.0
bus,2015-03-14 10:00:20,49.02,-123.0
car,2015-03-14 10:00:00,48.00,-122.0
";

    fn dashboard() -> Dashboard {
        let history = HistorySource::Csv(Arc::new(CsvHistory::load(HISTORY.as_bytes()).unwrap()));
        Dashboard::new(DashboardConfig::default(), history)
    }

    fn live(device: &str, latitude: f64) -> Event {
        Event::Live(LiveMessage::Position(
            PositionRecord::new(
                DeviceID::new(device),
                -123.0,
                latitude,
                Utc.timestamp_millis_opt(1_426_330_000_000).unwrap(),
            )
            .unwrap(),
        ))
    }

    fn visible(dashboard: &Dashboard) -> Vec<&str> {
        dashboard
            .map()
            .devices()
            .iter()
            .filter(|(_, m)| m.visible)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    async fn step_until<F: Fn(&Dashboard) -> bool>(dashboard: &mut Dashboard, done: F) {
        for _ in 0..1000 {
            if done(dashboard) {
                return;
            }
            assert!(dashboard.step().await.unwrap());
        }
        panic!("Dashboard never reached the expected state");
    }

    #[tokio::test(start_paused = true)]
    async fn playback_hides_the_live_view_until_stopped() {
        let mut dashboard = dashboard();
        dashboard.handle(live("bus", 49.5)).unwrap();
        dashboard.handle(live("car", 48.5)).unwrap();
        dashboard
            .handle(Event::Command(Command::Hide(DeviceID::new("car"))))
            .unwrap();
        assert_eq!(visible(&dashboard), vec!["bus"]);

        dashboard.send(Command::Play(vec![DeviceID::new("bus"), DeviceID::new("car")]));
        step_until(&mut dashboard, |d| d.animator().is_playing()).await;
        assert!(visible(&dashboard).is_empty());
        assert_eq!(dashboard.animator().tracks().len(), 2);
        // The car only has one record
        assert!(dashboard.animator().tracks()[1].is_completed());
        assert!(!dashboard.animator().controls().is_enabled(Control::Play));

        // Showing a device mid-playback takes effect afterwards
        dashboard
            .handle(Event::Command(Command::Show(DeviceID::new("car"))))
            .unwrap();
        assert!(visible(&dashboard).is_empty());

        step_until(&mut dashboard, |d| !d.animator().tick_scheduled()).await;
        assert!(dashboard.animator().tracks()[0].is_completed());
        assert_eq!(dashboard.map().segments().count(), 2);

        dashboard.send(Command::Stop);
        step_until(&mut dashboard, |d| !visible(d).is_empty()).await;
        assert_eq!(visible(&dashboard), vec!["bus", "car"]);
        assert_eq!(dashboard.map().segments().count(), 0);
        assert!(dashboard.animator().controls().is_enabled(Control::Play));
    }

    #[tokio::test(start_paused = true)]
    async fn visibility_is_restored_before_the_next_command() {
        let mut dashboard = dashboard();
        dashboard.handle(live("bus", 49.5)).unwrap();
        dashboard.send(Command::Play(vec![DeviceID::new("bus")]));
        step_until(&mut dashboard, |d| d.animator().is_playing()).await;
        assert!(visible(&dashboard).is_empty());

        dashboard.send(Command::Stop);
        dashboard.send(Command::Play(Vec::new()));
        step_until(&mut dashboard, |d| !d.animator().is_playing()).await;
        assert_eq!(visible(&dashboard), vec!["bus"]);

        // Playing nothing is ignored, so the live view stays as it was
        assert!(dashboard.step().await.unwrap());
        assert!(!dashboard.animator().is_playing());
        assert_eq!(visible(&dashboard), vec!["bus"]);

        // A later session still hides and restores the view
        dashboard.send(Command::Play(vec![DeviceID::new("bus")]));
        step_until(&mut dashboard, |d| d.animator().is_playing()).await;
        assert!(visible(&dashboard).is_empty());
        dashboard.send(Command::Stop);
        step_until(&mut dashboard, |d| !d.animator().is_playing()).await;
        assert_eq!(visible(&dashboard), vec!["bus"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume() {
        let mut dashboard = dashboard();
        dashboard.send(Command::Play(vec![DeviceID::new("bus")]));
        step_until(&mut dashboard, |d| {
            d.animator()
                .tracks()
                .first()
                .map(|t| t.progress() == 15)
                .unwrap_or(false)
        })
        .await;

        dashboard.send(Command::Pause);
        step_until(&mut dashboard, |d| d.animator().is_paused()).await;
        assert!(!dashboard.animator().tick_scheduled());

        // Playing again resumes instead of reloading
        dashboard.send(Command::Play(vec![DeviceID::new("car")]));
        step_until(&mut dashboard, |d| !d.animator().is_paused()).await;
        assert_eq!(dashboard.animator().tracks().len(), 1);
        assert_eq!(dashboard.animator().tracks()[0].progress(), 15);
        assert!(dashboard.step().await.unwrap());
        assert_eq!(dashboard.animator().tracks()[0].progress(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn run_exits_when_playback_finishes() {
        let mut dashboard = dashboard();
        dashboard.exit_when(ExitWhen::PlaybackFinished, None);
        dashboard.send(Command::Play(vec![DeviceID::new("bus"), DeviceID::new("nobody")]));
        dashboard.run().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown() {
        let mut dashboard = dashboard();
        dashboard.send(Command::Shutdown);
        assert!(!dashboard.step().await.unwrap());
    }

    #[tokio::test]
    async fn stale_history_is_ignored() {
        let mut dashboard = dashboard();
        dashboard
            .handle(Event::History {
                request: 7,
                idx: 0,
                result: Ok(Vec::new()),
            })
            .unwrap();
        assert!(!dashboard.animator().is_playing());
    }
}
