//! Error-reporting collaborator.
//!
//! The SDK reports logic errors and leaves breadcrumbs through [`ErrorReporter`]; nothing
//! reported here is surfaced to the embedding page.

use std::sync::{Arc, LazyLock, Mutex};

use serde_json::{Map, Value};

use crate::logger::Logger;
use crate::util::errors::ShopJsError;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/diagnostics"));

/// Messages produced by failed fetches in the major browsers, plus the analytics producer's
/// network markers. Errors matching these are counted, never reported.
pub const UNACTIONABLE_NETWORK_ERRORS: &[&str] = &[
    "Load failed",
    "Failed to fetch",
    "when attempting to fetch resource",
    "A network failure may have prevented the request from completing",
    "Backpressure applied",
];

pub type BreadcrumbMetadata = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreadcrumbType {
    Error,
    Log,
    Manual,
    Navigation,
    Process,
    Request,
    State,
    User,
}

impl BreadcrumbType {
    pub fn as_str(self) -> &'static str {
        match self {
            BreadcrumbType::Error => "error",
            BreadcrumbType::Log => "log",
            BreadcrumbType::Manual => "manual",
            BreadcrumbType::Navigation => "navigation",
            BreadcrumbType::Process => "process",
            BreadcrumbType::Request => "request",
            BreadcrumbType::State => "state",
            BreadcrumbType::User => "user",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Breadcrumb {
    pub name: String,
    pub metadata: BreadcrumbMetadata,
    pub kind: BreadcrumbType,
}

pub trait ErrorReporter: Send + Sync {
    fn notify(&self, error: ShopJsError);

    fn leave_breadcrumb(&self, name: &str, metadata: BreadcrumbMetadata, kind: BreadcrumbType);
}

pub fn is_unactionable_network_error(error: &ShopJsError) -> bool {
    UNACTIONABLE_NETWORK_ERRORS
        .iter()
        .any(|marker| error.message.contains(marker))
}

/// Reporter that writes to the SDK logger. Used when the host does not inject one.
#[derive(Debug)]
pub struct LoggingReporter {
    feature: String,
    network_errors: Mutex<u64>,
}

impl LoggingReporter {
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            network_errors: Mutex::new(0),
        }
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn network_error_count(&self) -> u64 {
        *self.network_errors.lock().unwrap()
    }
}

impl ErrorReporter for LoggingReporter {
    fn notify(&self, error: ShopJsError) {
        if is_unactionable_network_error(&error) {
            *self.network_errors.lock().unwrap() += 1;
            return;
        }
        LOGGER.error(format!(
            "[{}] {} (trace {})",
            self.feature, error, error.analytics_trace_id
        ));
    }

    fn leave_breadcrumb(&self, name: &str, metadata: BreadcrumbMetadata, kind: BreadcrumbType) {
        LOGGER.debug(format!(
            "[{}] breadcrumb {name} {} {}",
            self.feature,
            Value::Object(metadata),
            kind.as_str()
        ));
    }
}

/// Reporter that keeps everything in memory so tests can assert on it.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    errors: Mutex<Vec<ShopJsError>>,
    breadcrumbs: Mutex<Vec<Breadcrumb>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<ShopJsError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.breadcrumbs.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn notify(&self, error: ShopJsError) {
        self.errors.lock().unwrap().push(error);
    }

    fn leave_breadcrumb(&self, name: &str, metadata: BreadcrumbMetadata, kind: BreadcrumbType) {
        self.breadcrumbs.lock().unwrap().push(Breadcrumb {
            name: name.to_owned(),
            metadata,
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::errors::ErrorName;

    #[test]
    fn network_failures_are_counted_not_reported() {
        let reporter = LoggingReporter::new("login-button");
        reporter.notify(ShopJsError::new("TypeError: Failed to fetch", ErrorName::UnhandledError));
        reporter.notify(ShopJsError::new("boom", ErrorName::UnhandledError));
        assert_eq!(reporter.network_error_count(), 1);
        assert_eq!(reporter.feature(), "login-button");
    }

    #[test]
    fn recording_reporter_keeps_order() {
        let reporter = RecordingReporter::new();
        reporter.leave_breadcrumb("iframe loaded", Map::new(), BreadcrumbType::State);
        reporter.notify(ShopJsError::new("first", ErrorName::AuthorizeError));
        reporter.notify(ShopJsError::new("second", ErrorName::AuthorizeError));

        let messages: Vec<String> = reporter.errors().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["first", "second"]);
        assert_eq!(reporter.breadcrumbs()[0].kind, BreadcrumbType::State);
    }
}
