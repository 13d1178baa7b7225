//! Record store bindings
//!
//! Both hosted backends expose the same small capability set: fetch the most
//! recent rows, and push newly inserted ones. Everything above this module is
//! backend-agnostic.

mod firebase;
mod supabase;

pub use firebase::FirebaseSource;
pub use supabase::SupabaseSource;

use crate::config::{Backend, Config};
use crate::error::Result;
use crate::record::Record;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

/// Transport-level connectivity of the live feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    /// Connection open and subscription acknowledged
    Subscribed,
    /// Connection dropped
    Disconnected,
    /// Waiting to reconnect
    Reconnecting,
    /// Subscription rejected or transport failed
    Error(String),
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnState::Subscribed => f.write_str("subscribed"),
            ConnState::Disconnected => f.write_str("disconnected"),
            ConnState::Reconnecting => f.write_str("reconnecting"),
            ConnState::Error(e) => write!(f, "error: {}", e),
        }
    }
}

/// Delivered by a live subscription
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Insert(Record),
    Status(ConnState),
}

/// Handle to a running live subscription. Releasing or dropping it stops delivery.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A subscription that delivers nothing
    pub fn inert() -> Self {
        Self { task: None }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn release(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Releasing live subscription");
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Hosted record store capability
#[async_trait]
pub trait RecordSource: Send + Sync + 'static {
    /// Short backend name for logs and the header
    fn name(&self) -> &'static str;

    /// Up to `limit` records, newest `created_at` first
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Record>>;

    /// Start pushing inserts and connectivity changes into `sink`
    async fn subscribe(&self, sink: UnboundedSender<SourceEvent>) -> Result<Subscription>;
}

/// Build the binding selected in the config
pub fn from_config(config: &Config) -> Result<Arc<dyn RecordSource>> {
    config.validate()?;
    let source: Arc<dyn RecordSource> = match config.source.backend {
        Backend::Supabase => Arc::new(SupabaseSource::new(&config.source)?),
        Backend::Firebase => Arc::new(FirebaseSource::new(&config.source)?),
    };
    Ok(source)
}

/// Newest first, stable for equal timestamps
pub(crate) fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_stops_task() {
        tokio_test::block_on(async {
            let mut subscription = Subscription::new(tokio::spawn(std::future::pending::<()>()));
            assert!(subscription.is_active());

            subscription.release();
            assert!(!subscription.is_active());

            // Second release is a no-op
            subscription.release();
        });
    }

    #[test]
    fn test_inert_subscription() {
        assert!(!Subscription::inert().is_active());
    }

    #[test]
    fn test_conn_state_display() {
        assert_eq!(ConnState::Subscribed.to_string(), "subscribed");
        assert_eq!(
            ConnState::Error("CHANNEL_ERROR".into()).to_string(),
            "error: CHANNEL_ERROR"
        );
    }
}
