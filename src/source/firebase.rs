//! Firebase Realtime Database binding: REST reads, SSE streaming for inserts

use super::{sort_newest_first, ConnState, RecordSource, SourceEvent, Subscription};
use crate::config::SourceConfig;
use crate::error::{DashboardError, Result};
use crate::record::Record;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// Realtime Database client rooted at one child path
pub struct FirebaseSource {
    client: Client,
    stream_client: Client,
    base_url: String,
    path: String,
    auth: Option<String>,
    reconnect_delay: Duration,
}

/// Body of `put` / `patch` stream events
#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    #[serde(default)]
    data: Value,
}

/// What one SSE event means for the dashboard
#[derive(Debug)]
pub(crate) enum StreamFrame {
    /// Child records added under the watched path
    Inserts(Vec<Record>),
    /// Initial full-path payload; the snapshot load already covers it
    Initial,
    /// Heartbeat or an update with nothing to ingest
    Ignored,
    /// Server ended the stream; reconnect
    Closed(String),
}

impl FirebaseSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        // The event stream never completes, so only the connect is bounded
        let stream_client = Client::builder()
            .connect_timeout(config.timeout())
            .build()?;

        let auth = Some(config.api_key.trim().to_string()).filter(|k| !k.is_empty());

        Ok(Self {
            client,
            stream_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            path: config.table.trim_matches('/').to_string(),
            auth,
            reconnect_delay: config.reconnect_delay(),
        })
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/{}.json", self.base_url, self.path)
    }

    fn query(&self, limit: usize) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("orderBy", "\"created_at\"".to_string()),
            ("limitToLast", limit.to_string()),
        ];
        if let Some(auth) = &self.auth {
            query.push(("auth", auth.clone()));
        }
        query
    }
}

#[async_trait]
impl RecordSource for FirebaseSource {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Record>> {
        let url = self.endpoint();
        debug!("GET {} (limitToLast {})", url, limit);

        let response = self.client.get(&url).query(&self.query(limit)).send().await?;

        if !response.status().is_success() {
            return Err(DashboardError::Request {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await?;
        let mut records = children_to_records(body)?;
        sort_newest_first(&mut records);
        records.truncate(limit);
        Ok(records)
    }

    async fn subscribe(&self, sink: UnboundedSender<SourceEvent>) -> Result<Subscription> {
        let client = self.stream_client.clone();
        let url = self.endpoint();
        // Only children added after connect matter; keep the initial payload small
        let query = self.query(1);
        let delay = self.reconnect_delay;

        let task = tokio::spawn(async move {
            loop {
                match run_stream(&client, &url, &query, &sink).await {
                    Ok(reason) => info!(%reason, "Event stream ended"),
                    Err(e) => {
                        error!(error = %e, "Event stream failed");
                        let _ = sink.send(SourceEvent::Status(ConnState::Error(e.to_string())));
                    }
                }

                if sink.send(SourceEvent::Status(ConnState::Disconnected)).is_err() {
                    break;
                }
                if sink.send(SourceEvent::Status(ConnState::Reconnecting)).is_err() {
                    break;
                }
                tokio::time::sleep(delay).await;
            }
        });

        Ok(Subscription::new(task))
    }
}

async fn run_stream(
    client: &Client,
    url: &str,
    query: &[(&'static str, String)],
    sink: &UnboundedSender<SourceEvent>,
) -> Result<String> {
    info!("Opening event stream");
    let response = client
        .get(url)
        .query(query)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(DashboardError::Request {
            status: response.status().as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }

    let mut events = response.bytes_stream().eventsource();
    while let Some(event) = events.next().await {
        let event = event.map_err(|e| DashboardError::Feed(e.to_string()))?;
        let frame = match parse_event(&event.event, &event.data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, event = %event.event, "Skipping unreadable stream event");
                continue;
            }
        };

        match frame {
            StreamFrame::Initial => {
                info!("Successfully subscribed to real-time updates");
                if sink.send(SourceEvent::Status(ConnState::Subscribed)).is_err() {
                    return Ok("dashboard closed".to_string());
                }
            }
            StreamFrame::Inserts(records) => {
                for record in records {
                    debug!(id = ?record.id, "New record received");
                    if sink.send(SourceEvent::Insert(record)).is_err() {
                        return Ok("dashboard closed".to_string());
                    }
                }
            }
            StreamFrame::Ignored => {}
            StreamFrame::Closed(reason) => {
                let _ = sink.send(SourceEvent::Status(ConnState::Error(reason.clone())));
                return Ok(reason);
            }
        }
    }

    Ok("stream closed by server".to_string())
}

/// Interpret one SSE event from a Realtime Database stream.
pub(crate) fn parse_event(event: &str, data: &str) -> Result<StreamFrame> {
    match event {
        "put" | "patch" => {
            let payload: StreamPayload = serde_json::from_str(data)?;
            let path = payload.path.trim_matches('/');

            if path.is_empty() {
                return if event == "put" {
                    Ok(StreamFrame::Initial)
                } else {
                    // Root patch: map of child key to record
                    Ok(StreamFrame::Inserts(children_to_records(payload.data)?))
                };
            }

            // Deeper paths are field edits on an existing child
            if path.contains('/') || payload.data.is_null() {
                return Ok(StreamFrame::Ignored);
            }

            let record = serde_json::from_value::<Record>(payload.data)
                .map_err(|e| DashboardError::MalformedRecord(format!("{}: {}", path, e)))?
                .with_fallback_id(path);
            Ok(StreamFrame::Inserts(vec![record]))
        }
        "keep-alive" => Ok(StreamFrame::Ignored),
        "cancel" => Ok(StreamFrame::Closed("stream cancelled by security rules".to_string())),
        "auth_revoked" => Ok(StreamFrame::Closed("auth revoked".to_string())),
        other => {
            debug!(event = other, "Unknown stream event");
            Ok(StreamFrame::Ignored)
        }
    }
}

/// Turn a `{key: record}` object into records keyed by child key.
fn children_to_records(body: Value) -> Result<Vec<Record>> {
    let children: Map<String, Value> = match body {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        other => {
            return Err(DashboardError::MalformedRecord(format!(
                "expected object of children, got {}",
                other
            )))
        }
    };

    let mut records = Vec::with_capacity(children.len());
    for (key, value) in children {
        if value.is_null() {
            continue;
        }
        match serde_json::from_value::<Record>(value) {
            Ok(record) => records.push(record.with_fallback_id(key)),
            Err(e) => warn!(key = %key, error = %e, "Skipping malformed child"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;

    #[test]
    fn test_endpoint_and_query() {
        let config = SourceConfig {
            url: "https://demo.firebaseio.com/".to_string(),
            api_key: "secret".to_string(),
            table: "/crash_values/".to_string(),
            ..Default::default()
        };
        let source = FirebaseSource::new(&config).unwrap();
        assert_eq!(source.endpoint(), "https://demo.firebaseio.com/crash_values.json");

        let query = source.query(10);
        assert!(query.contains(&("orderBy", "\"created_at\"".to_string())));
        assert!(query.contains(&("limitToLast", "10".to_string())));
        assert!(query.contains(&("auth", "secret".to_string())));
    }

    #[test]
    fn test_no_auth_param_without_key() {
        let config = SourceConfig {
            url: "https://demo.firebaseio.com".to_string(),
            ..Default::default()
        };
        let source = FirebaseSource::new(&config).unwrap();
        assert!(source.query(1).iter().all(|(k, _)| *k != "auth"));
    }

    #[test]
    fn test_initial_put_is_not_an_insert() {
        let data = r#"{"path":"/","data":{"-a":{"created_at":1,"numeric_value":1.0}}}"#;
        assert!(matches!(parse_event("put", data).unwrap(), StreamFrame::Initial));
    }

    #[test]
    fn test_child_put_is_insert() {
        let data = r#"{"path":"/-NxNew","data":{"timestamp":"t","created_at":"2025-08-14T10:00:00Z","crash_value":"3.10x","numeric_value":3.1,"url":"u"}}"#;
        match parse_event("put", data).unwrap() {
            StreamFrame::Inserts(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].id, Some(RecordId::Text("-NxNew".to_string())));
            }
            other => panic!("expected inserts, got {:?}", other),
        }
    }

    #[test]
    fn test_removals_and_field_edits_ignored() {
        let removal = r#"{"path":"/-NxOld","data":null}"#;
        assert!(matches!(parse_event("put", removal).unwrap(), StreamFrame::Ignored));

        let field = r#"{"path":"/-NxOld/url","data":"x"}"#;
        assert!(matches!(parse_event("put", field).unwrap(), StreamFrame::Ignored));

        assert!(matches!(parse_event("keep-alive", "null").unwrap(), StreamFrame::Ignored));
    }

    #[test]
    fn test_root_patch_inserts_children() {
        let data = r#"{"path":"/","data":{
            "-a":{"created_at":"2025-08-14T10:00:00Z","numeric_value":1.5},
            "-b":{"created_at":"2025-08-14T10:00:05Z","numeric_value":2.5}
        }}"#;
        match parse_event("patch", data).unwrap() {
            StreamFrame::Inserts(records) => assert_eq!(records.len(), 2),
            other => panic!("expected inserts, got {:?}", other),
        }
    }

    #[test]
    fn test_cancel_and_revoke_close_stream() {
        assert!(matches!(parse_event("cancel", "null").unwrap(), StreamFrame::Closed(_)));
        assert!(matches!(
            parse_event("auth_revoked", "\"credential is no longer valid\"").unwrap(),
            StreamFrame::Closed(_)
        ));
    }

    #[test]
    fn test_children_to_records_skips_bad_rows() {
        let body: Value = serde_json::from_str(
            r#"{"-a":{"created_at":"2025-08-14T10:00:00Z","numeric_value":1.5},"-b":{"numeric_value":"?"}}"#,
        )
        .unwrap();
        let records = children_to_records(body).unwrap();
        assert_eq!(records.len(), 1);
        assert!(children_to_records(Value::Null).unwrap().is_empty());
    }
}
