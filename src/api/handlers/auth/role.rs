//! Account roles and the role → table dispatch.
//!
//! The platform keeps one table per account kind. Every auth operation takes
//! a wire role string, resolves it to a `Role` exactly once at the boundary,
//! and the storage layer derives the table name from it.

/// The four account kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Role {
    Candidate,
    Recruiter,
    College,
    Admin,
}

impl Role {
    pub const ALL: [Self; 4] = [Self::Candidate, Self::Recruiter, Self::College, Self::Admin];

    /// Wire string used in requests, responses, and session tokens.
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "job_seeker",
            Self::Recruiter => "employer",
            Self::College => "college",
            Self::Admin => "admin",
        }
    }

    /// Parse a role from request payloads. Strict: only the four wire names.
    pub(crate) fn from_wire(value: &str) -> Option<Self> {
        match value.trim() {
            "job_seeker" => Some(Self::Candidate),
            "employer" => Some(Self::Recruiter),
            "college" => Some(Self::College),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Parse a role claim from a bearer token. Accepts the legacy
    /// `college_student` alias, which maps to the candidate table.
    pub(crate) fn from_token_claim(value: &str) -> Option<Self> {
        match value.trim() {
            "college_student" => Some(Self::Candidate),
            other => Self::from_wire(other),
        }
    }

    /// Table holding accounts of this role.
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Candidate => "candidates",
            Self::Recruiter => "recruiters",
            Self::College => "colleges",
            Self::Admin => "admins",
        }
    }
}
