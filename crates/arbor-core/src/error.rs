use std::fmt;

/// Machine-readable error codes for conditions the projector reports.
///
/// Most of these are never surfaced as failures: duplicates, unresolved
/// parents, unavailable content and unknown trees are absorbed by the
/// projector and only show up in diagnostics. The codes still exist so logs
/// and the CLI can name them consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MalformedEvent,
    DuplicateEvent,
    TreeNotFound,
    UnresolvedParent,
    ContentUnavailable,
    BufferOverflow,
    ImportTimeout,
    ImportRejected,
    LockContention,
    CheckpointWriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MalformedEvent => "E1002",
            Self::DuplicateEvent => "E2001",
            Self::TreeNotFound => "E2002",
            Self::UnresolvedParent => "E2003",
            Self::ContentUnavailable => "E2004",
            Self::BufferOverflow => "E2005",
            Self::ImportTimeout => "E3001",
            Self::ImportRejected => "E3002",
            Self::LockContention => "E5001",
            Self::CheckpointWriteFailed => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MalformedEvent => "Malformed event",
            Self::DuplicateEvent => "Duplicate event ignored",
            Self::TreeNotFound => "Event buffered for unknown tree",
            Self::UnresolvedParent => "Node waiting for its parent",
            Self::ContentUnavailable => "Node content unavailable",
            Self::BufferOverflow => "Buffered event dropped",
            Self::ImportTimeout => "Import acknowledgement timed out",
            Self::ImportRejected => "Import rejected by remote",
            Self::LockContention => "Lock contention",
            Self::CheckpointWriteFailed => "Checkpoint write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .arbor/config.toml and retry."),
            Self::MalformedEvent => {
                Some("Check the event line against the documented JSON fields.")
            }
            Self::DuplicateEvent | Self::UnresolvedParent => None,
            Self::TreeNotFound => {
                Some("Deliver the TreeCreated event; buffered events apply once it lands.")
            }
            Self::ContentUnavailable => {
                Some("Content is fetched again on the next event touching the node.")
            }
            Self::BufferOverflow => {
                Some("Raise buffer.max_buffered_events or redeliver the dropped events.")
            }
            Self::ImportTimeout => Some(
                "Re-run the import; nodes already applied are skipped by node id.",
            ),
            Self::ImportRejected => Some("Inspect the remote rejection reason and retry."),
            Self::LockContention => {
                Some("Retry after the other arbor process releases its lock.")
            }
            Self::CheckpointWriteFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
