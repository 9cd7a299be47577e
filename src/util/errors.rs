use std::fmt;

use crate::util::casing::to_snake_case;
use crate::util::ids::generate_uuid_v4;

/// Closed set of error names reported by the SDK to its error-reporting collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorName {
    AbortSignalReceivedError,
    AuthorizeError,
    CustomElementMethodListenerError,
    DeprecatedAttributeError,
    ImportRetryError,
    MonorailProducerError,
    MonorailLogicError,
    ShopLoginIframeError,
    UnhandledError,
}

impl ErrorName {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorName::AbortSignalReceivedError => "AbortSignalReceivedError",
            ErrorName::AuthorizeError => "AuthorizeError",
            ErrorName::CustomElementMethodListenerError => "CustomElementMethodListenerError",
            ErrorName::DeprecatedAttributeError => "DeprecatedAttributeError",
            ErrorName::ImportRetryError => "ImportRetryError",
            ErrorName::MonorailProducerError => "MonorailProducerError",
            ErrorName::MonorailLogicError => "MonorailLogicError",
            ErrorName::ShopLoginIframeError => "ShopLoginIframeError",
            ErrorName::UnhandledError => "UnhandledError",
        }
    }
}

impl fmt::Display for ErrorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value handed to [`crate::diagnostics::ErrorReporter::notify`].
///
/// The `code` is the snake_case form of the name and every error carries the analytics
/// trace id it was raised under, so reports can be joined with analytics events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopJsError {
    pub name: ErrorName,
    pub code: String,
    pub message: String,
    pub analytics_trace_id: String,
}

impl ShopJsError {
    pub fn new(message: impl Into<String>, name: ErrorName) -> Self {
        Self::with_trace_id(message, name, generate_uuid_v4())
    }

    pub fn with_trace_id(
        message: impl Into<String>,
        name: ErrorName,
        analytics_trace_id: impl Into<String>,
    ) -> Self {
        Self {
            name,
            code: to_snake_case(name.as_str()),
            message: message.into(),
            analytics_trace_id: analytics_trace_id.into(),
        }
    }
}

impl fmt::Display for ShopJsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.name, self.message, self.code)
    }
}

impl std::error::Error for ShopJsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_snake_case_of_name() {
        let error = ShopJsError::new("Abort signal received", ErrorName::AbortSignalReceivedError);
        assert_eq!(error.code, "abort_signal_received_error");
        assert_eq!(error.analytics_trace_id.len(), 36);
        assert_eq!(
            error.to_string(),
            "AbortSignalReceivedError: Abort signal received (abort_signal_received_error)"
        );
    }

    #[test]
    fn explicit_trace_id_is_kept() {
        let error = ShopJsError::with_trace_id("twice", ErrorName::MonorailLogicError, "trace-1");
        assert_eq!(error.analytics_trace_id, "trace-1");
        assert_eq!(error.code, "monorail_logic_error");
    }
}
