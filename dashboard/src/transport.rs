use anyhow::Result;
use futures::StreamExt;
use futures_channel::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use records::LiveMessage;

use crate::config::TransportConfig;
use crate::Event;

/// Follows the live server's WebSocket, forwarding every message as an `Event`.
pub struct LiveClient {
    config: TransportConfig,
    events: UnboundedSender<Event>,
    task: Option<JoinHandle<()>>,
}

impl LiveClient {
    pub fn new(config: TransportConfig, events: UnboundedSender<Event>) -> Self {
        Self {
            config,
            events,
            task: None,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}/", self.config.host, self.config.port)
    }

    /// Opens the socket in the background. Only the first call does anything.
    pub fn connect(&mut self) {
        if self.task.is_some() {
            return;
        }
        let url = self.url();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            let reason = match listen(&url, &events).await {
                Ok(()) => None,
                Err(err) => Some(err.to_string()),
            };
            // Nobody's listening anymore if this fails
            let _ = events.unbounded_send(Event::TransportClosed(reason));
        }));
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn listen(url: &str, events: &UnboundedSender<Event>) -> Result<()> {
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await?;
    info!("Connected to {}", url);

    while let Some(msg) = socket.next().await {
        match msg? {
            Message::Text(text) => match LiveMessage::decode(&text) {
                Ok(msg) => {
                    if events.unbounded_send(Event::Live(msg)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("Skipping message from {}: {}", url, err);
                }
            },
            Message::Close(_) => {
                break;
            }
            _ => {}
        }
    }
    info!("Disconnected from {}", url);
    Ok(())
}
