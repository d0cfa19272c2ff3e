//! Error handling for the dataflow engine
//!
//! Each subsystem has its own error enum; [`EngineError`] wraps all of them
//! for callers that drive the engine end to end (configuration loading,
//! pipeline building).

use crate::filter::FilterError;
use crate::pipeline::PipelineError;
use crate::queue::QueueError;
use crate::schema::SchemaError;
use crate::settings::SettingsError;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration documents
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error below any layers of context.
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::WithContext { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EngineError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Config("missing filters".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing filters");
    }

    #[test]
    fn test_error_with_context() {
        let result: std::result::Result<(), QueueError> = Err(QueueError::WouldBlock);
        let err = result.context("Pushing sample").unwrap_err();
        assert!(err.to_string().starts_with("Pushing sample: "));
        assert!(matches!(
            err,
            EngineError::WithContext { ref source, .. }
                if matches!(**source, EngineError::Queue(QueueError::WouldBlock))
        ));
    }

    #[test]
    fn test_root_cause_skips_context_layers() {
        let err = EngineError::Config("bad".into())
            .with_context("inner")
            .with_context("outer");
        assert_eq!(err.to_string(), "outer: inner: Configuration error: bad");
        assert!(matches!(err.root_cause(), EngineError::Config(_)));
    }

    #[test]
    fn test_subsystem_conversion() {
        let err: EngineError = PipelineError::CycleDetected.into();
        assert!(err.to_string().contains("Cycle detected"));
    }
}
