//! Presentation model: plain rows and summary fields built from state

use crate::record::{parse_timestamp, Record, RecordId, Severity};
use crate::state::DashboardState;
use chrono::Local;

pub const NO_DATA: &str = "No data available";

/// One table row, ready to draw
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableRow {
    pub time: String,
    pub crash_value: String,
    pub numeric_value: String,
    pub severity: Severity,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableBody {
    /// Nothing passes the filter
    Placeholder(&'static str),
    Rows(Vec<RenderableRow>),
}

/// Header fields above the table
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub buffered: usize,
    pub last_update: Option<String>,
    pub status: String,
    pub feed: Option<String>,
    pub paused: bool,
    pub filter: Option<String>,
}

pub fn summary(state: &DashboardState) -> Summary {
    Summary {
        total: state.view().len(),
        buffered: state.buffer().len(),
        last_update: state
            .last_update()
            .map(|t| t.format("%H:%M:%S").to_string()),
        status: state.status().to_string(),
        feed: state.feed().map(|f| f.to_string()),
        paused: state.is_paused(),
        filter: state.applied_filter().map(|f| f.to_string()),
    }
}

/// The `limit` newest rows of the view.
pub fn table(records: &[Record], limit: usize, highlight: Option<&RecordId>) -> TableBody {
    if records.is_empty() {
        return TableBody::Placeholder(NO_DATA);
    }

    TableBody::Rows(
        records
            .iter()
            .take(limit)
            .map(|r| RenderableRow {
                time: display_time(&r.timestamp),
                crash_value: r.crash_value.clone(),
                numeric_value: format!("{:.2}", r.numeric_value),
                severity: r.severity(),
                highlighted: highlight.is_some_and(|id| r.key() == Some(id)),
            })
            .collect(),
    )
}

pub fn table_for(state: &DashboardState, limit: usize) -> TableBody {
    table(state.view(), limit, state.highlighted())
}

/// Local wall-clock form of a stored display timestamp; raw text if unreadable.
pub fn display_time(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(t) => t
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => raw.to_string(),
    }
}
