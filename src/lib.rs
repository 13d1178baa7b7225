//! crash-monitor library
//!
//! Live dashboard over a hosted table of crash game outcomes.
//!
//! # Layout
//!
//! - [`source`] - `RecordSource` trait with Supabase and Firebase bindings
//! - [`buffer`] / [`filter`] - pure data layer over the record buffer
//! - [`state`] - message-driven dashboard state
//! - [`view`] - presentation rows built from state
//! - [`app`] / [`tui`] - I/O driver and terminal front end
//!
//! # Usage
//!
//! ```rust,ignore
//! use crash_monitor::{app::App, config::Config, source};
//!
//! let config = Config::load(None)?;
//! let source = source::from_config(&config)?;
//! crash_monitor::tui::run(App::new(source, &config)).await?;
//! ```

pub mod app;
pub mod buffer;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod record;
pub mod source;
pub mod state;
pub mod tui;
pub mod view;

pub use error::{DashboardError, Result};
