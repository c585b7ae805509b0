#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod config;
mod controller;
mod controls;
mod history;
mod map;
mod transport;

pub use config::{DashboardConfig, HistoryConfig, TransportConfig};
pub use controller::{Command, Dashboard, Event, ExitWhen};
pub use controls::ControlPanel;
pub use history::{HistoryClient, HistorySource};
pub use map::{DrawnSegment, Marker, TrailMap};
pub use transport::LiveClient;
