use anyhow::Result;
use serde::Deserialize;

use crate::{DeviceID, PositionRecord, Record};

/// One message pushed by the live server.
#[derive(Clone, Debug, PartialEq)]
pub enum LiveMessage {
    Position(PositionRecord),
    Presence { device: DeviceID, connected: bool },
}

// Records and presence events share no discriminator; a record is anything with coordinates.
#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Position(Record),
    Presence { id: DeviceID, connected: bool },
}

impl LiveMessage {
    pub fn decode(text: &str) -> Result<Self> {
        Ok(match serde_json::from_str(text)? {
            Raw::Position(rec) => LiveMessage::Position(rec.into_position()?),
            Raw::Presence { id, connected } => LiveMessage::Presence {
                device: id,
                connected,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn position() {
        let msg = LiveMessage::decode(
            r#"{"id": "tab", "latitude": 49.0, "longitude": -122.5, "timestamp": 1000}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            LiveMessage::Position(
                PositionRecord::new(
                    DeviceID::new("tab"),
                    -122.5,
                    49.0,
                    Utc.timestamp_millis_opt(1000).unwrap(),
                )
                .unwrap()
            )
        );
    }

    #[test]
    fn presence() {
        let msg = LiveMessage::decode(r#"{"id": "tab", "connected": false}"#).unwrap();
        assert_eq!(
            msg,
            LiveMessage::Presence {
                device: DeviceID::new("tab"),
                connected: false,
            }
        );
    }

    #[test]
    fn garbage() {
        assert!(LiveMessage::decode(r#"{"id": "tab"}"#).is_err());
        assert!(LiveMessage::decode("not json").is_err());
    }
}
