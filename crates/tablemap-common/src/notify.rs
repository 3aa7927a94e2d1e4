//! User-facing notifications for absorbed failures.
//!
//! Fetch and decode failures never propagate as errors past the pipeline;
//! they are reported here and the caller receives an empty result.

use std::sync::Mutex;

use tracing::error;

use crate::error::TableError;

/// What stage the failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Fetching rows (network, remote status, cache or row parsing).
    Fetch,
    /// Decoding fetched rows into features or rasters.
    Parse,
}

/// A failure report naming the table it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub table: String,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, table: impl Into<String>, err: &TableError) -> Self {
        Self {
            kind,
            table: table.into(),
            message: err.to_string(),
        }
    }

    /// Text shown to the user.
    pub fn text(&self) -> String {
        match self.kind {
            NoticeKind::Fetch => format!(
                "An error occurred when fetching data from {}: {}",
                self.table, self.message
            ),
            NoticeKind::Parse => format!(
                "An error occurred when parsing data from {}: {}",
                self.table, self.message
            ),
        }
    }
}

/// Receives notices. Implementations must not fail.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Logs every notice at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        error!(table = %notice.table, kind = ?notice.kind, "{}", notice.text());
    }
}

/// Keeps every notice; used by the CLI summary and tests.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.notices.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notice: Notice) {
        LogNotifier.notify(notice.clone());
        if let Ok(mut guard) = self.notices.lock() {
            guard.push(notice);
        }
    }
}
