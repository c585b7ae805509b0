#[macro_use]
extern crate log;

use anyhow::Result;
use structopt::StructOpt;

use dashboard::{Command, Dashboard, DashboardConfig, ExitWhen, HistorySource};
use records::DeviceID;

#[derive(StructOpt)]
struct Args {
    /// A JSON file overriding parts of the default configuration
    #[structopt(long)]
    config: Option<String>,
    /// The API key for the history database. Without one, the config file's key or
    /// $DASHBOARD_API_KEY is used.
    #[structopt(long)]
    api_key: Option<String>,
    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(StructOpt)]
enum Cmd {
    /// List every device that has ever reported a position
    Devices {
        /// Read history from this CSV file instead of the database
        #[structopt(long)]
        history_csv: Option<String>,
    },
    /// Replay the recent history of some devices, then export the trail as GeoJSON
    Replay {
        #[structopt(long = "device", required = true)]
        devices: Vec<String>,
        /// How many recent records to replay per device
        #[structopt(long)]
        count: Option<usize>,
        /// Read history from this CSV file instead of the database
        #[structopt(long)]
        history_csv: Option<String>,
        #[structopt(long)]
        output: Option<String>,
    },
    /// Follow the live server until it disconnects
    Watch {
        /// Where to export the last known positions
        #[structopt(long)]
        output: Option<String>,
    },
}

impl Args {
    fn load_config(&mut self) -> Result<DashboardConfig> {
        let mut config = DashboardConfig::load(self.config.take())?;
        if let Some(key) = self.api_key.take() {
            config.history.api_key = key;
        } else if config.history.api_key.is_empty() {
            if let Ok(key) = std::env::var("DASHBOARD_API_KEY") {
                config.history.api_key = key;
            }
        }
        Ok(config)
    }

    async fn run(mut self) -> Result<()> {
        let mut config = self.load_config()?;

        match self.cmd {
            Cmd::Devices { history_csv } => {
                let history = history_source(&config, history_csv)?;
                for device in history.all_devices().await? {
                    println!("{}", device);
                }
            }
            Cmd::Replay {
                devices,
                count,
                history_csv,
                output,
            } => {
                if let Some(count) = count {
                    config.history_count = count;
                    config.validate()?;
                }
                let history = history_source(&config, history_csv)?;
                let mut dashboard = Dashboard::new(config, history);
                dashboard.exit_when(ExitWhen::PlaybackFinished, output);
                dashboard.send(Command::Play(
                    devices.into_iter().map(DeviceID::new).collect(),
                ));
                dashboard.run().await?;
            }
            Cmd::Watch { output } => {
                let history = HistorySource::remote(config.history.clone());
                let mut dashboard = Dashboard::new(config, history);
                dashboard.exit_when(ExitWhen::TransportClosed, output);
                dashboard.connect_live();
                dashboard.run().await?;
            }
        }
        Ok(())
    }
}

fn history_source(config: &DashboardConfig, csv: Option<String>) -> Result<HistorySource> {
    match csv {
        Some(path) => HistorySource::load_csv(&path),
        None => {
            if config.history.api_key.is_empty() {
                warn!("No API key for the history database; pass --api-key or set DASHBOARD_API_KEY");
            }
            Ok(HistorySource::remote(config.history.clone()))
        }
    }
}

fn main() -> Result<()> {
    abstutil::logger::setup();

    let args = Args::from_iter(abstutil::cli_args());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(args.run())
}
