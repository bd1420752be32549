use std::fmt;

/// Machine-readable error codes for operators and scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    InvalidIdentifier,
    InvalidOrigin,
    InvalidRange,
    StoreUnavailable,
    StoreQueryFailed,
    CorruptStore,
    LookupFailed,
    BindFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InvalidIdentifier => "E2001",
            Self::InvalidOrigin => "E2002",
            Self::InvalidRange => "E2003",
            Self::StoreUnavailable => "E3001",
            Self::StoreQueryFailed => "E3002",
            Self::CorruptStore => "E3003",
            Self::LookupFailed => "E4001",
            Self::BindFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidIdentifier => "Invalid tracking identifier",
            Self::InvalidOrigin => "Invalid origin address",
            Self::InvalidRange => "Invalid time range",
            Self::StoreUnavailable => "Event store unavailable",
            Self::StoreQueryFailed => "Event store query failed",
            Self::CorruptStore => "Corrupt event store row",
            Self::LookupFailed => "Location lookup failed",
            Self::BindFailed => "Failed to bind listener",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `bcn init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .beacon/config.toml and retry."),
            Self::InvalidIdentifier => {
                Some("Identifiers are 1-100 characters with no '/' or control characters.")
            }
            Self::InvalidOrigin => None,
            Self::InvalidRange => {
                Some("Use RFC 3339 or YYYY-MM-DD bounds, or a 7d/30d/90d preset.")
            }
            Self::StoreUnavailable => {
                Some("Check that .beacon/beacon.db is readable and not locked.")
            }
            Self::StoreQueryFailed => Some("Retry once. If persistent, report a bug with logs."),
            Self::CorruptStore => Some("Inspect .beacon/beacon.db with sqlite3 for damaged rows."),
            Self::LookupFailed => None,
            Self::BindFailed => Some("Pick a free address with `bcn serve --bind`."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl serde::Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
