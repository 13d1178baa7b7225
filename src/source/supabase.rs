//! Supabase binding: PostgREST for reads, Phoenix realtime channel for inserts

use super::{sort_newest_first, ConnState, RecordSource, SourceEvent, Subscription};
use crate::config::SourceConfig;
use crate::error::{DashboardError, Result};
use crate::record::Record;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const CHANNEL: &str = "crash_values_changes";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const JOIN_REF: &str = "1";

/// Supabase project client
pub struct SupabaseSource {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
    reconnect_delay: Duration,
}

/// Phoenix channel frame (protocol vsn 1.0.0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl SupabaseSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            table: config.table.clone(),
            reconnect_delay: config.reconnect_delay(),
        })
    }

    fn rest_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| DashboardError::Config(format!("api_key is not a valid header: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| DashboardError::Config(format!("api_key is not a valid header: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Realtime endpoint derived from the project URL
    pub(crate) fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.api_key
        )
    }

    pub(crate) fn join_frame(&self) -> PhoenixFrame {
        PhoenixFrame {
            topic: format!("realtime:{}", CHANNEL),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "INSERT", "schema": "public", "table": self.table }
                    ]
                },
                "access_token": self.api_key,
            }),
            reference: Some(JOIN_REF.to_string()),
        }
    }
}

#[async_trait]
impl RecordSource for SupabaseSource {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Record>> {
        let url = format!("{}/rest/v1/{}", self.base_url, self.table);
        debug!("GET {} (limit {})", url, limit);

        let response = self
            .client
            .get(&url)
            .headers(self.rest_headers()?)
            .query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DashboardError::Request {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let rows: Vec<Value> = response.json().await?;
        let mut records = rows_to_records(rows);
        sort_newest_first(&mut records);
        records.truncate(limit);
        Ok(records)
    }

    async fn subscribe(&self, sink: UnboundedSender<SourceEvent>) -> Result<Subscription> {
        let url = self.realtime_url();
        let join = serde_json::to_string(&self.join_frame())?;
        let delay = self.reconnect_delay;

        let task = tokio::spawn(async move {
            loop {
                match run_channel(&url, &join, &sink).await {
                    Ok(()) => info!("Realtime channel closed"),
                    Err(e) => {
                        error!(error = %e, "Realtime channel failed");
                        let _ = sink.send(SourceEvent::Status(ConnState::Error(e.to_string())));
                    }
                }

                if sink.send(SourceEvent::Status(ConnState::Disconnected)).is_err() {
                    break;
                }
                if sink.send(SourceEvent::Status(ConnState::Reconnecting)).is_err() {
                    break;
                }
                info!(delay_ms = delay.as_millis(), "Reconnecting realtime channel...");
                tokio::time::sleep(delay).await;
            }
        });

        Ok(Subscription::new(task))
    }
}

/// One websocket session: join, heartbeat, forward inserts until the socket ends.
async fn run_channel(url: &str, join: &str, sink: &UnboundedSender<SourceEvent>) -> Result<()> {
    info!("Connecting to realtime channel");
    let (ws, _) = connect_async(url).await?;
    let (mut write, mut read) = ws.split();

    write.send(Message::Text(join.to_string())).await?;

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut heartbeat_ref: u64 = 1;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                heartbeat_ref += 1;
                let frame = PhoenixFrame {
                    topic: "phoenix".to_string(),
                    event: "heartbeat".to_string(),
                    payload: json!({}),
                    reference: Some(heartbeat_ref.to_string()),
                };
                write.send(Message::Text(serde_json::to_string(&frame)?)).await?;
            }
            msg = read.next() => {
                let Some(msg) = msg else { return Ok(()) };
                match msg? {
                    Message::Text(text) => {
                        if let Some(event) = parse_frame(&text) {
                            if sink.send(event).is_err() {
                                // Receiver gone: dashboard shut down
                                return Ok(());
                            }
                        }
                    }
                    Message::Ping(data) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Message::Close(frame) => {
                        debug!(?frame, "Realtime socket closed by server");
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Decode PostgREST rows, skipping any that do not form a record.
fn rows_to_records(rows: Vec<Value>) -> Vec<Record> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value::<Record>(row) {
            Ok(record) => records.push(record),
            Err(e) => warn!(error = %e, "Skipping malformed row"),
        }
    }
    records
}

/// Translate one channel frame into a source event, if it carries one.
pub(crate) fn parse_frame(text: &str) -> Option<SourceEvent> {
    let frame: PhoenixFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Unparseable realtime frame");
            return None;
        }
    };

    match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(JOIN_REF) => {
            let status = frame.payload.get("status").and_then(Value::as_str);
            if status == Some("ok") {
                info!("Successfully subscribed to real-time updates");
                Some(SourceEvent::Status(ConnState::Subscribed))
            } else {
                let reason = frame
                    .payload
                    .pointer("/response/reason")
                    .and_then(Value::as_str)
                    .unwrap_or("join rejected");
                Some(SourceEvent::Status(ConnState::Error(reason.to_string())))
            }
        }
        "postgres_changes" => {
            let data = frame.payload.get("data")?;
            let kind = data.get("type").and_then(Value::as_str);
            if kind.is_some_and(|k| k != "INSERT") {
                return None;
            }
            let record = data.get("record")?.clone();
            match serde_json::from_value::<Record>(record) {
                Ok(record) => {
                    debug!(id = ?record.id, "New record received");
                    Some(SourceEvent::Insert(record))
                }
                Err(e) => {
                    warn!(error = %e, "Dropping malformed realtime record");
                    None
                }
            }
        }
        "system" => {
            let status = frame.payload.get("status").and_then(Value::as_str);
            if status == Some("error") {
                let message = frame
                    .payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("channel error");
                Some(SourceEvent::Status(ConnState::Error(message.to_string())))
            } else {
                None
            }
        }
        "phx_error" => Some(SourceEvent::Status(ConnState::Error(
            "channel error".to_string(),
        ))),
        "phx_close" => Some(SourceEvent::Status(ConnState::Disconnected)),
        _ => None,
    }
}
