//! Dashboard state and its update function
//!
//! All data and UI state lives in [`DashboardState`]. Event handlers never
//! touch it directly: they send a [`Message`], `update` applies it, and any
//! I/O the message calls for comes back as a [`Command`] for the driver.

use crate::buffer::{Ingest, RecordBuffer};
use crate::config::DashboardConfig;
use crate::export;
use crate::filter::{Filter, FilterInputs, TimeRange};
use crate::record::{Record, RecordId};
use crate::source::{ConnState, SourceEvent};
use chrono::{DateTime, Duration, Local, Utc};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Data connection status shown in the summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Loading,
    Connected,
    Error(String),
    RealtimeError,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Loading => f.write_str("Loading..."),
            ConnectionStatus::Connected => f.write_str("Connected"),
            ConnectionStatus::Error(msg) => write!(f, "Error: {}", msg),
            ConnectionStatus::RealtimeError => f.write_str("Real-time Error"),
        }
    }
}

/// Inputs to the dashboard
#[derive(Debug, Clone)]
pub enum Message {
    /// Start a full reload
    SnapshotRequested,
    SnapshotLoaded(Vec<Record>),
    SnapshotFailed(String),
    /// Live feed delivery
    Feed(SourceEvent),
    /// Fallback timer fired
    PollTick,
    PollFetched(Vec<Record>),
    PollFailed(String),
    SetMinValue(String),
    SetMaxValue(String),
    SetTimeRange(TimeRange),
    ApplyFilters,
    ClearFilters,
    TogglePause,
    Export,
    Exported(PathBuf),
    ExportFailed(String),
    /// Expire highlights and toasts
    Tick,
}

/// I/O requested by `update`
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Fetch the full recent window
    LoadSnapshot { limit: usize },
    /// Fetch the newest few for the missed-update check
    Poll { limit: usize },
    /// Write an export file
    WriteExport { file_name: String, contents: String },
}

/// Short-lived on-screen notice
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub text: String,
    pub expires_at: DateTime<Utc>,
}

/// Timing and sizing knobs taken from config
#[derive(Debug, Clone)]
pub struct Settings {
    pub capacity: usize,
    pub poll_limit: usize,
    pub highlight: Duration,
    pub toast: Duration,
    pub notify_new_records: bool,
}

impl Settings {
    pub fn from_config(config: &DashboardConfig, notify_new_records: bool) -> Self {
        Self {
            capacity: config.buffer_capacity,
            poll_limit: config.poll_limit,
            highlight: Duration::milliseconds(config.highlight_ms as i64),
            toast: Duration::milliseconds(config.toast_ms as i64),
            notify_new_records,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&DashboardConfig::default(), false)
    }
}

pub struct DashboardState {
    settings: Settings,
    buffer: RecordBuffer,
    view: Vec<Record>,
    inputs: FilterInputs,
    /// Predicate behind the current view, if any
    applied: Option<Filter>,
    paused: bool,
    status: ConnectionStatus,
    feed: Option<ConnState>,
    last_update: Option<DateTime<Utc>>,
    highlight: Option<(RecordId, DateTime<Utc>)>,
    toast: Option<Toast>,
}

impl DashboardState {
    pub fn new(settings: Settings) -> Self {
        Self {
            buffer: RecordBuffer::new(settings.capacity),
            settings,
            view: Vec::new(),
            inputs: FilterInputs::default(),
            applied: None,
            paused: false,
            status: ConnectionStatus::Loading,
            feed: None,
            last_update: None,
            highlight: None,
            toast: None,
        }
    }

    pub fn buffer(&self) -> &RecordBuffer {
        &self.buffer
    }

    /// Filtered view, newest first
    pub fn view(&self) -> &[Record] {
        &self.view
    }

    pub fn inputs(&self) -> &FilterInputs {
        &self.inputs
    }

    pub fn applied_filter(&self) -> Option<&Filter> {
        self.applied.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn feed(&self) -> Option<&ConnState> {
        self.feed.as_ref()
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update.map(|t| t.with_timezone(&Local))
    }

    pub fn highlighted(&self) -> Option<&RecordId> {
        self.highlight.as_ref().map(|(id, _)| id)
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.toast.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply one message. `now` drives time filters and expiries.
    pub fn update(&mut self, msg: Message, now: DateTime<Utc>) -> Option<Command> {
        match msg {
            Message::SnapshotRequested => {
                self.status = ConnectionStatus::Loading;
                return Some(Command::LoadSnapshot {
                    limit: self.settings.capacity,
                });
            }
            Message::SnapshotLoaded(records) => {
                info!("Loaded {} records", records.len());
                self.buffer.replace(records);
                self.refresh_view(now);
                self.last_update = Some(now);
                self.status = ConnectionStatus::Connected;
            }
            Message::SnapshotFailed(err) => {
                warn!("Error loading data: {}", err);
                self.status = ConnectionStatus::Error(err);
            }
            Message::Feed(SourceEvent::Insert(record)) => self.on_live_record(record, now),
            Message::Feed(SourceEvent::Status(state)) => return self.on_feed_status(state),
            Message::PollTick => {
                if !self.paused {
                    return Some(Command::Poll {
                        limit: self.settings.poll_limit,
                    });
                }
            }
            Message::PollFetched(records) => {
                if !self.paused && self.buffer.missed_any(&records) {
                    debug!("Poll found records the live feed missed, reloading");
                    return self.update(Message::SnapshotRequested, now);
                }
            }
            Message::PollFailed(err) => {
                warn!("Polling error: {}", err);
                self.status = ConnectionStatus::Error(err);
            }
            Message::SetMinValue(raw) => self.inputs.min_value = raw,
            Message::SetMaxValue(raw) => self.inputs.max_value = raw,
            Message::SetTimeRange(range) => self.inputs.time_range = range,
            Message::ApplyFilters => self.apply_filters(now),
            Message::ClearFilters => self.clear_filters(),
            Message::TogglePause => {
                self.paused = !self.paused;
                info!(paused = self.paused, "Live updates toggled");
            }
            Message::Export => return self.export(now),
            Message::Exported(path) => {
                info!("Exported {} records to {}", self.view.len(), path.display());
                self.show_toast(format!("Exported to {}", path.display()), now);
            }
            Message::ExportFailed(err) => {
                warn!("Export failed: {}", err);
                self.show_toast(format!("Export failed: {}", err), now);
            }
            Message::Tick => self.expire(now),
        }
        None
    }

    fn on_live_record(&mut self, record: Record, now: DateTime<Utc>) {
        if self.paused {
            debug!(id = ?record.id, "Paused, dropping live record");
            return;
        }

        let id = record.id.clone();
        let crash_value = record.crash_value.clone();
        if self.buffer.ingest(record) == Ingest::Duplicate {
            debug!(id = ?id, "Duplicate live record ignored");
            return;
        }

        self.refresh_view(now);
        self.last_update = Some(now);
        if let Some(id) = id {
            self.highlight = Some((id, now + self.settings.highlight));
        }
        if self.settings.notify_new_records {
            self.show_toast(format!("New crash: {}", crash_value), now);
        }
    }

    fn on_feed_status(&mut self, state: ConnState) -> Option<Command> {
        info!("Subscription status: {}", state);
        let failed = matches!(state, ConnState::Error(_));
        self.feed = Some(state);

        if failed {
            self.status = ConnectionStatus::RealtimeError;
            // Polling stands in for the feed until it recovers
            if !self.paused {
                return Some(Command::Poll {
                    limit: self.settings.poll_limit,
                });
            }
        }
        None
    }

    /// Recompute the view from the current inputs.
    pub fn apply_filters(&mut self, now: DateTime<Utc>) {
        let filter = self.inputs.parse();
        self.view = filter.apply(self.buffer.records(), now);
        self.applied = Some(filter);
    }

    /// Reset inputs and mirror the buffer.
    pub fn clear_filters(&mut self) {
        self.inputs = FilterInputs::default();
        self.applied = None;
        self.view = self.buffer.records().to_vec();
    }

    /// Buffer changed: filter again if any input is set, otherwise mirror.
    fn refresh_view(&mut self, now: DateTime<Utc>) {
        if self.inputs.is_active() {
            self.apply_filters(now);
        } else {
            self.applied = None;
            self.view = self.buffer.records().to_vec();
        }
    }

    fn export(&mut self, now: DateTime<Utc>) -> Option<Command> {
        match export::to_csv(&self.view) {
            Ok(contents) => Some(Command::WriteExport {
                file_name: export::file_name(now.date_naive()),
                contents,
            }),
            Err(e) => {
                self.show_toast(e.to_string(), now);
                None
            }
        }
    }

    fn show_toast(&mut self, text: String, now: DateTime<Utc>) {
        self.toast = Some(Toast {
            text,
            expires_at: now + self.settings.toast,
        });
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        if self.highlight.as_ref().is_some_and(|(_, until)| *until <= now) {
            self.highlight = None;
        }
        if self.toast.as_ref().is_some_and(|t| t.expires_at <= now) {
            self.toast = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(id: i64, value: f64, created_at: DateTime<Utc>) -> Record {
        Record {
            id: Some(RecordId::Int(id)),
            timestamp: created_at.to_rfc3339(),
            created_at,
            crash_value: format!("{:.2}x", value),
            numeric_value: value,
            url: "https://example.test".to_string(),
            created_at_text: created_at.to_rfc3339(),
            numeric_value_text: value.to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 14, 12, 0, 0).unwrap()
    }

    fn loaded(records: Vec<Record>) -> DashboardState {
        let mut state = DashboardState::new(Settings::default());
        state.update(Message::SnapshotLoaded(records), now());
        state
    }

    #[test]
    fn test_snapshot_request_sets_loading() {
        let mut state = DashboardState::new(Settings::default());
        let cmd = state.update(Message::SnapshotRequested, now());
        assert_eq!(cmd, Some(Command::LoadSnapshot { limit: 1000 }));
        assert_eq!(state.status().to_string(), "Loading...");
    }

    #[test]
    fn test_snapshot_failure_keeps_buffer() {
        let mut state = loaded(vec![rec(1, 1.0, now())]);
        state.update(Message::SnapshotFailed("timeout".into()), now());
        assert_eq!(state.buffer().len(), 1);
        assert_eq!(state.view().len(), 1);
        assert_eq!(state.status().to_string(), "Error: timeout");
    }

    #[test]
    fn test_snapshot_reload_reapplies_active_filter() {
        let mut state = loaded(vec![rec(1, 1.0, now()), rec(2, 4.0, now())]);
        state.update(Message::SetMinValue("3".into()), now());
        state.update(Message::ApplyFilters, now());
        assert_eq!(state.view().len(), 1);

        let reload = vec![
            rec(3, 6.0, now()),
            rec(4, 1.5, now() - Duration::seconds(1)),
            rec(5, 3.0, now() - Duration::seconds(2)),
        ];
        state.update(Message::SnapshotLoaded(reload), now());

        let ids: Vec<_> = state.view().iter().filter_map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![RecordId::Int(3), RecordId::Int(5)]);
        assert_eq!(state.buffer().len(), 3);
        assert!(state.applied_filter().is_some());
    }

    #[test]
    fn test_poll_failure_keeps_buffer() {
        let mut state = loaded(vec![rec(1, 1.0, now()), rec(2, 2.0, now())]);
        let cmd = state.update(Message::PollFailed("connection reset".into()), now());

        assert!(cmd.is_none());
        assert_eq!(state.buffer().len(), 2);
        assert_eq!(state.view().len(), 2);
        assert_eq!(state.status().to_string(), "Error: connection reset");
    }

    #[test]
    fn test_live_record_prepends_and_highlights() {
        let mut state = loaded(vec![rec(1, 1.0, now() - Duration::seconds(10))]);
        state.update(Message::Feed(SourceEvent::Insert(rec(2, 3.0, now()))), now());

        assert_eq!(state.view()[0].id, Some(RecordId::Int(2)));
        assert_eq!(state.highlighted(), Some(&RecordId::Int(2)));

        state.update(Message::Tick, now() + Duration::seconds(3));
        assert!(state.highlighted().is_none());
    }

    #[test]
    fn test_duplicate_live_record_kept_once() {
        let mut state = loaded(vec![]);
        let r = rec(5, 2.0, now());
        state.update(Message::Feed(SourceEvent::Insert(r.clone())), now());
        state.update(Message::Feed(SourceEvent::Insert(r)), now());
        assert_eq!(state.buffer().len(), 1);
        assert_eq!(state.view().len(), 1);
    }

    #[test]
    fn test_paused_drops_live_records() {
        let mut state = loaded(vec![]);
        state.update(Message::TogglePause, now());
        state.update(Message::Feed(SourceEvent::Insert(rec(1, 2.0, now()))), now());
        assert!(state.view().is_empty());

        state.update(Message::TogglePause, now());
        state.update(Message::Feed(SourceEvent::Insert(rec(2, 2.0, now()))), now());
        assert_eq!(state.view().len(), 1);
        assert_eq!(state.view()[0].id, Some(RecordId::Int(2)));
    }

    #[test]
    fn test_poll_skipped_while_paused() {
        let mut state = loaded(vec![]);
        assert_eq!(
            state.update(Message::PollTick, now()),
            Some(Command::Poll { limit: 10 })
        );
        state.update(Message::TogglePause, now());
        assert_eq!(state.update(Message::PollTick, now()), None);
    }

    #[test]
    fn test_poll_with_unknown_id_triggers_reload() {
        let mut state = loaded(vec![rec(1, 1.0, now())]);
        let same = state.update(Message::PollFetched(vec![rec(1, 1.0, now())]), now());
        assert_eq!(same, None);

        let missed = state.update(
            Message::PollFetched(vec![rec(2, 1.0, now()), rec(1, 1.0, now())]),
            now(),
        );
        assert_eq!(missed, Some(Command::LoadSnapshot { limit: 1000 }));
    }

    #[test]
    fn test_filters_reapplied_on_new_data() {
        let mut state = loaded(vec![rec(1, 1.0, now()), rec(2, 3.0, now())]);
        state.update(Message::SetMinValue("2".into()), now());
        state.update(Message::ApplyFilters, now());
        assert_eq!(state.view().len(), 1);

        state.update(Message::Feed(SourceEvent::Insert(rec(3, 1.5, now()))), now());
        assert_eq!(state.view().len(), 1);
        state.update(Message::Feed(SourceEvent::Insert(rec(4, 9.0, now()))), now());
        assert_eq!(state.view().len(), 2);
    }

    #[test]
    fn test_clear_filters_restores_mirror() {
        let mut state = loaded(vec![rec(1, 1.0, now()), rec(2, 3.0, now())]);
        state.update(Message::SetMinValue("2".into()), now());
        state.update(Message::SetMaxValue("4".into()), now());
        state.update(Message::SetTimeRange(TimeRange::LastHour), now());
        state.update(Message::ApplyFilters, now());
        assert_eq!(state.view().len(), 1);

        state.update(Message::ClearFilters, now());
        assert_eq!(state.inputs(), &FilterInputs::default());
        assert_eq!(state.view(), state.buffer().records());
        assert!(state.applied_filter().is_none());
    }

    #[test]
    fn test_export_empty_is_refused() {
        let mut state = loaded(vec![]);
        assert_eq!(state.update(Message::Export, now()), None);
        assert_eq!(state.toast().map(|t| t.text.as_str()), Some("No data to export"));
    }

    #[test]
    fn test_export_builds_file_command() {
        let mut state = loaded(vec![rec(1, 1.0, now()), rec(2, 3.0, now())]);
        match state.update(Message::Export, now()) {
            Some(Command::WriteExport { file_name, contents }) => {
                assert_eq!(file_name, "crash_data_2025-08-14.csv");
                assert_eq!(contents.lines().count(), 3);
            }
            other => panic!("expected export command, got {:?}", other),
        }
    }

    #[test]
    fn test_feed_error_falls_back_to_poll() {
        let mut state = loaded(vec![]);
        let cmd = state.update(
            Message::Feed(SourceEvent::Status(ConnState::Error("CHANNEL_ERROR".into()))),
            now(),
        );
        assert_eq!(cmd, Some(Command::Poll { limit: 10 }));
        assert_eq!(state.status().to_string(), "Real-time Error");
    }

    #[test]
    fn test_toast_only_when_enabled() {
        let mut state = loaded(vec![]);
        state.update(Message::Feed(SourceEvent::Insert(rec(1, 2.0, now()))), now());
        assert!(state.toast().is_none());

        let settings = Settings {
            notify_new_records: true,
            ..Settings::default()
        };
        let mut state = DashboardState::new(settings);
        state.update(Message::Feed(SourceEvent::Insert(rec(1, 2.0, now()))), now());
        assert_eq!(state.toast().map(|t| t.text.as_str()), Some("New crash: 2.00x"));

        state.update(Message::Tick, now() + Duration::seconds(4));
        assert!(state.toast().is_none());
    }
}
