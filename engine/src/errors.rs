//! Error types for the reconciliation engine
//!
//! Only run-fatal conditions are errors. A guard that says "no" while
//! processing a single case is an [`Outcome`](crate::outcome::Outcome), never
//! an `Err`.

use thiserror::Error;

/// Error category for structured logging and exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration file missing fields, unparsable, or violating invariants
    ConfigError,
    /// One of the four input datasets could not be loaded or normalized
    DatasetError,
    /// Durable history store unreachable or returned malformed rows
    HistoryError,
    /// Catalog API call failed
    CatalogError,
    /// Ranking or deny-list feed failed
    FeedError,
    /// Report could not be rendered, written or published
    ReportError,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::DatasetError => "DATASET_ERROR",
            Self::HistoryError => "HISTORY_ERROR",
            Self::CatalogError => "CATALOG_ERROR",
            Self::FeedError => "FEED_ERROR",
            Self::ReportError => "REPORT_ERROR",
        }
    }
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Engine error with category and context
#[derive(Debug, Error)]
pub enum UsageGuardError {
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("dataset error: {message}")]
    Dataset {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("history store error: {message}")]
    History {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("catalog error: {message}")]
    Catalog {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("feed error: {message}")]
    Feed {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("report error: {message}")]
    Report {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl UsageGuardError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::ConfigError,
            Self::Dataset { .. } => ErrorCategory::DatasetError,
            Self::History { .. } => ErrorCategory::HistoryError,
            Self::Catalog { .. } => ErrorCategory::CatalogError,
            Self::Feed { .. } => ErrorCategory::FeedError,
            Self::Report { .. } => ErrorCategory::ReportError,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a dataset error
    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a collaborator failure as a fatal dataset load error
    pub fn dataset_with_source(message: impl Into<String>, source: UsageGuardError) -> Self {
        Self::Dataset {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a history store error
    pub fn history(message: impl Into<String>) -> Self {
        Self::History {
            message: message.into(),
            source: None,
        }
    }

    /// Create a history store error with source
    pub fn history_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::History {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
            source: None,
        }
    }

    /// Create a catalog error with source
    pub fn catalog_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Catalog {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a feed error
    pub fn feed(message: impl Into<String>) -> Self {
        Self::Feed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a feed error with source
    pub fn feed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Feed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a report error
    pub fn report(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
            source: None,
        }
    }

    /// Create a report error with source
    pub fn report_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Report {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, UsageGuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes() {
        assert_eq!(
            UsageGuardError::config("x").category().as_str(),
            "CONFIG_ERROR"
        );
        assert_eq!(UsageGuardError::feed("x").category().as_str(), "FEED_ERROR");
    }

    #[test]
    fn test_dataset_error_keeps_source() {
        let inner = UsageGuardError::feed("ranking feed returned 503");
        let err = UsageGuardError::dataset_with_source("failed to load usage ranking", inner);

        assert_eq!(err.category(), ErrorCategory::DatasetError);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("feed error: ranking feed returned 503")
        );
    }
}
