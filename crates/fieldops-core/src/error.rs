use std::fmt;

use thiserror::Error;

/// Machine-readable error codes for operator tooling and log filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    RecordNotFound,
    InvalidStageTransition,
    AlreadyCalled,
    RecordDeleted,
    NotDeleted,
    InvalidEnumValue,
    MalformedRecord,
    StoreUnavailable,
    StoreRejected,
    StoreDecodeFailed,
    LeaseHeld,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::RecordNotFound => "E2001",
            Self::InvalidStageTransition => "E2002",
            Self::AlreadyCalled => "E2003",
            Self::RecordDeleted => "E2004",
            Self::NotDeleted => "E2007",
            Self::InvalidEnumValue => "E2005",
            Self::MalformedRecord => "E2006",
            Self::StoreUnavailable => "E5001",
            Self::StoreRejected => "E5002",
            Self::StoreDecodeFailed => "E5003",
            Self::LeaseHeld => "E5004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and operator output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::RecordNotFound => "Work order not found",
            Self::InvalidStageTransition => "Invalid stage transition",
            Self::AlreadyCalled => "Locate already called",
            Self::RecordDeleted => "Work order is in the recycle bin",
            Self::NotDeleted => "Work order is not in the recycle bin",
            Self::InvalidEnumValue => "Invalid call type/stage/checklist value",
            Self::MalformedRecord => "Malformed work order record",
            Self::StoreUnavailable => "Persistence API unavailable",
            Self::StoreRejected => "Persistence API rejected the request",
            Self::StoreDecodeFailed => "Persistence API response could not be decoded",
            Self::LeaseHeld => "Long-running action already in progress",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .fieldops/config.toml and retry."),
            Self::RecordNotFound => Some("Refresh the list; the record may have been removed."),
            Self::InvalidStageTransition => {
                Some("Stages run creation -> permitting -> approved -> testing -> completed.")
            }
            Self::AlreadyCalled => Some("The call timer is already running for this locate."),
            Self::RecordDeleted => Some("Restore the work order from the recycle bin first."),
            Self::NotDeleted => Some("Refresh the list; the record may already be restored."),
            Self::InvalidEnumValue => None,
            Self::MalformedRecord => Some("Check the record's id and timestamp fields."),
            Self::StoreUnavailable => Some("Check network connectivity and retry."),
            Self::StoreRejected => None,
            Self::StoreDecodeFailed => Some("Check that the API base URL points at the work-order service."),
            Self::LeaseHeld => Some("Wait for the running action to finish or time out."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Operator intent that a [`TransitionRejected`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    MarkCalled,
    Complete,
    Edit,
    CompleteItem,
    MoveForward,
    MoveBackward,
    SoftDelete,
    Restore,
}

impl Action {
    const fn as_str(self) -> &'static str {
        match self {
            Self::MarkCalled => "mark-called",
            Self::Complete => "complete",
            Self::Edit => "edit",
            Self::CompleteItem => "complete-item",
            Self::MoveForward => "move-forward",
            Self::MoveBackward => "move-backward",
            Self::SoftDelete => "soft-delete",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally rejected mutation. Nothing was sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{action} rejected for {id}: {reason}")]
pub struct TransitionRejected {
    pub id: String,
    pub action: Action,
    pub code: ErrorCode,
    pub reason: &'static str,
}

impl TransitionRejected {
    pub(crate) fn new(id: &str, action: Action, code: ErrorCode, reason: &'static str) -> Self {
        Self {
            id: id.to_string(),
            action,
            code,
            reason,
        }
    }
}

/// Failure reported by a [`crate::repo::Repository`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{resource}/{id}: not found")]
    NotFound { resource: &'static str, id: String },

    #[error("{}: unavailable: {message}", target(.resource, .id.as_deref()))]
    Unavailable {
        resource: &'static str,
        id: Option<String>,
        message: String,
    },

    #[error("{}: rejected with HTTP {status}: {message}", target(.resource, .id.as_deref()))]
    Rejected {
        resource: &'static str,
        id: Option<String>,
        status: u16,
        message: String,
    },

    #[error("{resource}: undecodable payload: {message}")]
    Decode {
        resource: &'static str,
        message: String,
    },
}

fn target(resource: &str, id: Option<&str>) -> String {
    id.map_or_else(|| resource.to_string(), |id| format!("{resource}/{id}"))
}

impl StoreError {
    /// Machine-readable code associated with this store error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::RecordNotFound,
            Self::Unavailable { .. } => ErrorCode::StoreUnavailable,
            Self::Rejected { .. } => ErrorCode::StoreRejected,
            Self::Decode { .. } => ErrorCode::StoreDecodeFailed,
        }
    }

    /// Record id the failure refers to, when it refers to one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::NotFound { id, .. } => Some(id),
            Self::Unavailable { id, .. } | Self::Rejected { id, .. } => id.as_deref(),
            Self::Decode { .. } => None,
        }
    }
}

/// Union of everything a view-level mutation can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Rejected(#[from] TransitionRejected),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{resource}/{id}: not in the current list")]
    UnknownRecord { resource: &'static str, id: String },

    #[error("{resource}/{id}: patch could not be computed: {message}")]
    Patch {
        resource: &'static str,
        id: String,
        message: String,
    },
}

impl EngineError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Rejected(rejected) => rejected.code,
            Self::Store(err) => err.code(),
            Self::UnknownRecord { .. } => ErrorCode::RecordNotFound,
            Self::Patch { .. } => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
