use std::sync::Arc;

use anyhow::Result;
use reqwest::{Client, Response, Url};

use records::{Batch, CsvHistory, DeviceID};

use crate::config::HistoryConfig;

/// Fetches position history from a document database's REST API.
#[derive(Clone)]
pub struct HistoryClient {
    client: Client,
    config: HistoryConfig,
}

impl HistoryClient {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn base(&self) -> String {
        format!(
            "{}/databases/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.database
        )
    }

    /// The latest `count` records of one device, newest first
    pub fn recent_history_url(&self, device: &DeviceID, count: usize) -> Result<Url> {
        let query = serde_json::json!({ "id": device.as_str() }).to_string();
        let url = Url::parse_with_params(
            &format!("{}/collections/{}", self.base(), self.config.collection),
            &[
                ("apiKey", self.config.api_key.clone()),
                ("l", count.to_string()),
                ("s", r#"{"timestamp":-1}"#.to_string()),
                ("q", query),
            ],
        )?;
        Ok(url)
    }

    pub fn all_devices_url(&self) -> Result<Url> {
        let url = Url::parse_with_params(
            &format!("{}/runCommand", self.base()),
            &[("apiKey", self.config.api_key.as_str())],
        )?;
        Ok(url)
    }

    pub async fn recent_history(&self, device: &DeviceID, count: usize) -> Result<Batch> {
        let url = self.recent_history_url(device, count)?;
        debug!("Fetching {} records of {}", count, device);
        let resp = self.client.get(url).send().await.map_err(|e| e.without_url())?;
        let bytes = read_ok(resp).await?;
        records::decode_history(&bytes)
    }

    pub async fn all_devices(&self) -> Result<Vec<DeviceID>> {
        let url = self.all_devices_url()?;
        let body = serde_json::json!({ "distinct": self.config.collection, "key": "id" });
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| e.without_url())?;
        let bytes = read_ok(resp).await?;
        records::decode_devices(&bytes)
    }
}

// Every URL here carries the API key, so errors never mention one
async fn read_ok(resp: Response) -> Result<Vec<u8>> {
    let status = resp.status();
    if !status.is_success() {
        let mut url = resp.url().clone();
        url.set_query(None);
        bail!("{} returned {}", url, status);
    }
    let bytes = resp.bytes().await.map_err(|e| e.without_url())?;
    Ok(bytes.to_vec())
}

/// Anywhere position history can come from.
#[derive(Clone)]
pub enum HistorySource {
    Remote(HistoryClient),
    Csv(Arc<CsvHistory>),
}

impl HistorySource {
    pub fn remote(config: HistoryConfig) -> Self {
        HistorySource::Remote(HistoryClient::new(config))
    }

    pub fn load_csv(path: &str) -> Result<Self> {
        let file = fs_err::File::open(path)?;
        Ok(HistorySource::Csv(Arc::new(CsvHistory::load(file)?)))
    }

    /// Newest first, possibly with gaps
    pub async fn recent_history(&self, device: &DeviceID, count: usize) -> Result<Batch> {
        match self {
            HistorySource::Remote(client) => client.recent_history(device, count).await,
            HistorySource::Csv(csv) => Ok(csv.recent(device, count)),
        }
    }

    pub async fn all_devices(&self) -> Result<Vec<DeviceID>> {
        match self {
            HistorySource::Remote(client) => client.all_devices().await,
            HistorySource::Csv(csv) => Ok(csv.devices()),
        }
    }
}
