use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::{Batch, DeviceID, PositionRecord};

/// Position history read from a CSV export, for replaying without a database.
pub struct CsvHistory {
    // Sorted by time, oldest first
    per_device: BTreeMap<DeviceID, Vec<PositionRecord>>,
}

impl CsvHistory {
    pub fn load<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut per_device: BTreeMap<DeviceID, Vec<PositionRecord>> = BTreeMap::new();
        let mut skipped = 0;
        for rec in csv::Reader::from_reader(reader).deserialize() {
            let rec: Row = rec?;
            let time = match NaiveDateTime::parse_from_str(&rec.timestamp, "%Y-%m-%d %H:%M:%S") {
                Ok(datetime) => Utc.from_utc_datetime(&datetime),
                Err(err) => {
                    warn!("Skipping CSV row with timestamp {}: {}", rec.timestamp, err);
                    skipped += 1;
                    continue;
                }
            };
            match PositionRecord::new(rec.id, rec.longitude, rec.latitude, time) {
                Ok(pos) => {
                    per_device
                        .entry(pos.device.clone())
                        .or_insert_with(Vec::new)
                        .push(pos);
                }
                Err(err) => {
                    warn!("Skipping CSV row: {}", err);
                    skipped += 1;
                }
            }
        }
        for records in per_device.values_mut() {
            records.sort_by_key(|rec| rec.time);
        }
        info!(
            "Loaded CSV history for {} devices, skipped {} rows",
            per_device.len(),
            skipped
        );
        Ok(Self { per_device })
    }

    pub fn devices(&self) -> Vec<DeviceID> {
        self.per_device.keys().cloned().collect()
    }

    /// The latest `count` records of a device, latest first, like a history query. Unknown
    /// devices have no records.
    pub fn recent(&self, device: &DeviceID, count: usize) -> Batch {
        match self.per_device.get(device) {
            Some(records) => records
                .iter()
                .rev()
                .take(count)
                .cloned()
                .map(Some)
                .collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct Row {
    id: DeviceID,
    timestamp: String,
    latitude: f64,
    longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "id,timestamp,latitude,longitude
bus,2015-03-14 10:00:02,49.2,-123.2
bus,2015-03-14 10:00:00,49.0,-123.0
car,2015-03-14 09:00:00,48.0,-122.0
bus,2015-03-14 10:00:01,49.1,-123.1
bus,2015-03-14 10:00:03,95.0,-123.1
";

    #[test]
    fn recent_is_latest_first() {
        let history = CsvHistory::load(INPUT.as_bytes()).unwrap();
        assert_eq!(
            history.devices(),
            vec![DeviceID::new("bus"), DeviceID::new("car")]
        );

        let batch = history.recent(&DeviceID::new("bus"), 2);
        let lats: Vec<f64> = batch.iter().map(|r| r.as_ref().unwrap().latitude).collect();
        assert_eq!(lats, vec![49.2, 49.1]);

        assert_eq!(history.recent(&DeviceID::new("bus"), 100).len(), 3);
        assert!(history.recent(&DeviceID::new("truck"), 5).is_empty());
    }

    #[test]
    fn bad_timestamp_skips_the_row() {
        let input = "id,timestamp,latitude,longitude
bus,yesterday,49.0,-123.0
bus,2015-03-14 10:00:00,49.1,-123.0
";
        let history = CsvHistory::load(input.as_bytes()).unwrap();
        let batch = history.recent(&DeviceID::new("bus"), 10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].as_ref().unwrap().latitude, 49.1);
    }

    #[test]
    fn unparseable_row() {
        let input = "id,timestamp,latitude,longitude\nbus,2015-03-14 10:00:00,north,-123.0\n";
        assert!(CsvHistory::load(input.as_bytes()).is_err());
    }
}
