use thiserror::Error;
use tracing::error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Orchestrator is shut down")]
    OrchestratorClosed,

    #[error("Session collaborator error: {0}")]
    Collaborator(String),

    #[error("Radio error: {0}")]
    Radio(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Context for error logging
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub session_id: Option<u64>,
    pub peer_id: Option<String>,
    pub verb: Option<&'static str>,
    pub additional_info: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, session_id: u64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_peer_id(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = Some(peer_id.into());
        self
    }

    pub fn with_verb(mut self, verb: &'static str) -> Self {
        self.verb = Some(verb);
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }
}

impl BridgeError {
    /// Log error with structured context
    pub fn log_with_context(&self, context: &ErrorContext) {
        error!(
            error = %self,
            category = %self.category(),
            session_id = ?context.session_id,
            peer_id = ?context.peer_id,
            verb = ?context.verb,
            additional_info = ?context.additional_info,
            "Bridge error occurred"
        );
    }

    /// Wire error code returned to the calling application
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidArgument(_) => "INVALID",
            BridgeError::UnsupportedOperation(_) => "UNSUPPORTED",
            BridgeError::OrchestratorClosed => "UNAVAILABLE",
            BridgeError::Collaborator(_) | BridgeError::Radio(_) => "INTERNAL",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::InvalidArgument(_) => ErrorCategory::Validation,
            BridgeError::UnsupportedOperation(_) => ErrorCategory::Unsupported,
            BridgeError::OrchestratorClosed => ErrorCategory::Lifecycle,
            BridgeError::Collaborator(_) | BridgeError::Radio(_) => ErrorCategory::Collaborator,
        }
    }
}

/// Error categories for log aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Unsupported,
    Lifecycle,
    Collaborator,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Unsupported => write!(f, "unsupported"),
            ErrorCategory::Lifecycle => write!(f, "lifecycle"),
            ErrorCategory::Collaborator => write!(f, "collaborator"),
        }
    }
}
