//! Application driver for crash-monitor
//!
//! Owns the dashboard state, turns its commands into I/O on the record
//! source, and feeds the results back in as messages.

use crate::config::Config;
use crate::export;
use crate::source::{ConnState, RecordSource, SourceEvent, Subscription};
use crate::state::{Command, DashboardState, Message, Settings};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

/// Input focus
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Key bindings act on the dashboard
    Normal,
    /// Typing the minimum value
    EditMin,
    /// Typing the maximum value
    EditMax,
}

pub struct App {
    state: DashboardState,
    source: Arc<dyn RecordSource>,
    /// Results of spawned fetches
    msg_tx: UnboundedSender<Message>,
    msg_rx: UnboundedReceiver<Message>,
    /// Live feed deliveries
    feed_tx: UnboundedSender<SourceEvent>,
    feed_rx: UnboundedReceiver<SourceEvent>,
    subscription: Option<Subscription>,
    export_dir: PathBuf,
    poll_interval: Duration,
    last_poll: Instant,
    table_rows: usize,
    mode: Mode,
    /// Text being typed in an edit mode
    edit: String,
    should_quit: bool,
}

impl App {
    pub fn new(source: Arc<dyn RecordSource>, config: &Config) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let settings = Settings::from_config(&config.dashboard, config.notify_new_records());

        Self {
            state: DashboardState::new(settings),
            source,
            msg_tx,
            msg_rx,
            feed_tx,
            feed_rx,
            subscription: None,
            export_dir: config.export.directory.clone(),
            poll_interval: config.dashboard.poll_interval(),
            last_poll: Instant::now(),
            table_rows: config.dashboard.table_rows,
            mode: Mode::Normal,
            edit: String::new(),
            should_quit: false,
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn table_rows(&self) -> usize {
        self.table_rows
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn edit_buffer(&self) -> &str {
        &self.edit
    }

    pub fn edit_buffer_mut(&mut self) -> &mut String {
        &mut self.edit
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Initial load plus live subscription
    pub async fn start(&mut self) {
        self.dispatch(Message::SnapshotRequested);

        match self.source.subscribe(self.feed_tx.clone()).await {
            Ok(subscription) => {
                info!("Real-time subscription set up ({})", self.source.name());
                self.subscription = Some(subscription);
            }
            Err(e) => {
                error!("Failed to subscribe: {}", e);
                self.dispatch(Message::Feed(SourceEvent::Status(ConnState::Error(
                    e.to_string(),
                ))));
            }
        }
        self.last_poll = Instant::now();
    }

    /// Apply a message and run whatever I/O it asks for.
    pub fn dispatch(&mut self, msg: Message) {
        let mut pending = Some(msg);
        while let Some(msg) = pending.take() {
            if let Some(cmd) = self.state.update(msg, Utc::now()) {
                pending = self.execute(cmd);
            }
        }
    }

    fn execute(&mut self, cmd: Command) -> Option<Message> {
        match cmd {
            Command::LoadSnapshot { limit } => {
                let source = Arc::clone(&self.source);
                let tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let msg = match source.fetch_recent(limit).await {
                        Ok(records) => Message::SnapshotLoaded(records),
                        Err(e) => Message::SnapshotFailed(e.to_string()),
                    };
                    let _ = tx.send(msg);
                });
                None
            }
            Command::Poll { limit } => {
                self.last_poll = Instant::now();
                let source = Arc::clone(&self.source);
                let tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let msg = match source.fetch_recent(limit).await {
                        Ok(records) => Message::PollFetched(records),
                        Err(e) => Message::PollFailed(e.to_string()),
                    };
                    let _ = tx.send(msg);
                });
                None
            }
            Command::WriteExport {
                file_name,
                contents,
            } => Some(
                match export::write_file(&self.export_dir, &file_name, &contents) {
                    Ok(path) => Message::Exported(path),
                    Err(e) => Message::ExportFailed(e.to_string()),
                },
            ),
        }
    }

    /// Drain everything delivered since the last call, in arrival order per channel.
    pub fn pump(&mut self) {
        while let Ok(event) = self.feed_rx.try_recv() {
            self.dispatch(Message::Feed(event));
        }
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.dispatch(msg);
        }
    }

    /// Timer work: fallback poll and expiry of transient UI.
    pub fn tick(&mut self) {
        if self.last_poll.elapsed() >= self.poll_interval {
            self.last_poll = Instant::now();
            self.dispatch(Message::PollTick);
        }
        self.dispatch(Message::Tick);
    }

    /// Wait for the next delivery from either channel and apply it.
    /// Returns false once both channels are closed.
    pub async fn process_next(&mut self) -> bool {
        let msg = tokio::select! {
            Some(event) = self.feed_rx.recv() => Message::Feed(event),
            Some(msg) = self.msg_rx.recv() => msg,
            else => return false,
        };
        self.dispatch(msg);
        true
    }

    pub fn begin_edit(&mut self, mode: Mode) {
        self.edit = match mode {
            Mode::EditMin => self.state.inputs().min_value.clone(),
            Mode::EditMax => self.state.inputs().max_value.clone(),
            Mode::Normal => String::new(),
        };
        self.mode = mode;
    }

    /// Store the typed value in the filter inputs
    pub fn commit_edit(&mut self) {
        let value = std::mem::take(&mut self.edit);
        match self.mode {
            Mode::EditMin => self.dispatch(Message::SetMinValue(value)),
            Mode::EditMax => self.dispatch(Message::SetMaxValue(value)),
            Mode::Normal => {}
        }
        self.mode = Mode::Normal;
    }

    pub fn cancel_edit(&mut self) {
        self.edit.clear();
        self.mode = Mode::Normal;
    }

    pub fn cycle_time_range(&mut self) {
        let next = self.state.inputs().time_range.cycle();
        self.dispatch(Message::SetTimeRange(next));
    }

    /// Stop live delivery. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.release();
            debug!("Live subscription released");
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
    }
}
