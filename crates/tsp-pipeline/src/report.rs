//! Diagnostic report sinks.
//!
//! The source mutates a global-ish "current report" pointer per plugin.
//! Here a [`ReportSink`] is an explicit field on the plugin's execution
//! context, swapped at restart time by [`crate::restart`] and restored on
//! completion, rather than a process-wide pointer.

use std::sync::{Arc, Mutex};

/// Severity of a reported message, mirroring `tracing`'s levels so sink
/// implementations can forward into `tracing` directly if desired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// A destination for plugin and restart diagnostics.
pub trait ReportSink: Send + Sync {
    fn report(&self, level: ReportLevel, message: &str);
}

pub type SharedReportSink = Arc<dyn ReportSink>;

/// Forwards every report into `tracing` at the matching level. The
/// default sink for stages that have not had their report redirected.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Debug => tracing::debug!("{message}"),
            ReportLevel::Info => tracing::info!("{message}"),
            ReportLevel::Warning => tracing::warn!("{message}"),
            ReportLevel::Error => tracing::error!("{message}"),
        }
    }
}

/// Collects reports in memory, used by the supervisor to retrieve
/// restart-time diagnostics (e.g. "new configuration rejected: ...").
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<(ReportLevel, String)>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(ReportLevel, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(level, _)| *level == ReportLevel::Error)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl ReportSink for CollectingSink {
    fn report(&self, level: ReportLevel, message: &str) {
        self.messages.lock().unwrap().push((level, message.to_string()));
    }
}
