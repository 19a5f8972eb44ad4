use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::snapshot::RestoreReport;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Success,
    Notice,
    Warning,
    Error,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Success => "success",
            MessageKind::Notice => "notice",
            MessageKind::Warning => "warning",
            MessageKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationMessage {
    pub kind: MessageKind,
    pub text: String,
    pub detail: Option<String>,
    pub timestamp: DateTime<Local>,
}

/// Everything a caller needs to report on one migration run.
///
/// Built incrementally while the run progresses and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    messages: Vec<MigrationMessage>,
    success: bool,
    #[serde(serialize_with = "serialize_elapsed_ms")]
    elapsed: Duration,
    executed: usize,
    total: usize,
    backup_path: Option<PathBuf>,
    restore: Option<RestoreReport>,
}

fn serialize_elapsed_ms<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(elapsed.as_secs_f64() * 1000.0)
}

impl Default for MigrationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationResult {
    pub fn new() -> Self {
        MigrationResult {
            messages: Vec::new(),
            success: true,
            elapsed: Duration::ZERO,
            executed: 0,
            total: 0,
            backup_path: None,
            restore: None,
        }
    }

    pub fn push(&mut self, kind: MessageKind, text: impl Into<String>, detail: Option<String>) {
        self.messages.push(MigrationMessage {
            kind,
            text: text.into(),
            detail,
            timestamp: Local::now(),
        });
    }

    pub fn success(&mut self, text: impl Into<String>, detail: Option<String>) {
        self.push(MessageKind::Success, text, detail);
    }

    pub fn notice(&mut self, text: impl Into<String>, detail: Option<String>) {
        self.push(MessageKind::Notice, text, detail);
    }

    pub fn warning(&mut self, text: impl Into<String>, detail: Option<String>) {
        self.push(MessageKind::Warning, text, detail);
    }

    /// Record an error message. An error always marks the run as failed.
    pub fn error(&mut self, text: impl Into<String>, detail: Option<String>) {
        self.success = false;
        self.push(MessageKind::Error, text, detail);
    }

    pub fn set_counts(&mut self, executed: usize, total: usize) {
        self.executed = executed;
        self.total = total;
    }

    pub fn set_backup_path(&mut self, path: PathBuf) {
        self.backup_path = Some(path);
    }

    pub fn set_restore(&mut self, report: RestoreReport) {
        self.restore = Some(report);
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    pub fn messages(&self) -> &[MigrationMessage] {
        &self.messages
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn executed(&self) -> usize {
        self.executed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn backup_path(&self) -> Option<&PathBuf> {
        self.backup_path.as_ref()
    }

    pub fn restore(&self) -> Option<&RestoreReport> {
        self.restore.as_ref()
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.messages.iter().filter(|m| m.kind == kind).count()
    }

    /// Percentage of messages that are successes, rounded. 0 when empty.
    pub fn success_rate(&self) -> u32 {
        if self.messages.is_empty() {
            return 0;
        }
        let rate = self.count(MessageKind::Success) as f64 / self.messages.len() as f64;
        (rate * 100.0).round() as u32
    }
}
