#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod csv_history;
mod ids;
mod live;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use geom::LonLat;
use serde::Deserialize;

pub use csv_history::CsvHistory;
pub use ids::DeviceID;
pub use live::LiveMessage;

/// One reported location of a device.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionRecord {
    pub device: DeviceID,
    pub longitude: f64,
    pub latitude: f64,
    pub time: DateTime<Utc>,
}

/// Position records for one device as the history source returns them: latest first, with
/// `None` wherever the source had no usable record.
pub type Batch = Vec<Option<PositionRecord>>;

impl PositionRecord {
    pub fn new(device: DeviceID, longitude: f64, latitude: f64, time: DateTime<Utc>) -> Result<Self> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            bail!("{:?} has invalid longitude {}", device, longitude);
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            bail!("{:?} has invalid latitude {}", device, latitude);
        }
        Ok(Self {
            device,
            longitude,
            latitude,
            time,
        })
    }

    pub fn pos(&self) -> LonLat {
        LonLat::new(self.longitude, self.latitude)
    }
}

/// Decodes a JSON array of records, latest first. `null` entries and records with unusable
/// coordinates or timestamps become gaps; only malformed JSON is an error.
pub fn decode_history(bytes: &[u8]) -> Result<Batch> {
    let raw: Vec<Option<Record>> = serde_json::from_slice(bytes)?;
    Ok(raw
        .into_iter()
        .map(|rec| match rec?.into_position() {
            Ok(pos) => Some(pos),
            Err(err) => {
                warn!("Treating a history record as a gap: {}", err);
                None
            }
        })
        .collect())
}

/// Decodes the response of a distinct-ids command, `{"values": [...]}`.
pub fn decode_devices(bytes: &[u8]) -> Result<Vec<DeviceID>> {
    let distinct: Distinct = serde_json::from_slice(bytes)?;
    Ok(distinct.values)
}

// The wire shape shared by history responses and live messages
#[derive(Deserialize)]
struct Record {
    id: DeviceID,
    latitude: f64,
    longitude: f64,
    /// Milliseconds since the Unix epoch
    timestamp: i64,
}

impl Record {
    fn into_position(self) -> Result<PositionRecord> {
        let time = match Utc.timestamp_millis_opt(self.timestamp).single() {
            Some(time) => time,
            None => bail!("{:?} has out-of-range timestamp {}", self.id, self.timestamp),
        };
        PositionRecord::new(self.id, self.longitude, self.latitude, time)
    }
}

#[derive(Deserialize)]
struct Distinct {
    values: Vec<DeviceID>,
}
