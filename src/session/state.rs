use std::fmt;

use crate::auth::DenyReason;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Suggesting,
    Searching,
    /// Also covers "no results" when the result list is empty.
    ResultsShown,
    SummaryLoading,
    SummaryShown,
    /// A gated action was refused. Dismissing returns to `resume`.
    AuthRequired {
        reason: DenyReason,
        resume: Box<SessionState>,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Suggesting => "suggesting",
            SessionState::Searching => "searching",
            SessionState::ResultsShown => "results",
            SessionState::SummaryLoading => "summary-loading",
            SessionState::SummaryShown => "summary",
            SessionState::AuthRequired { .. } => "auth-required",
        }
    }

    /// The state the user returns to once any sign-in prompt is dismissed.
    pub fn underlying(&self) -> &SessionState {
        match self {
            SessionState::AuthRequired { resume, .. } => resume.underlying(),
            other => other,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether an event changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Handled {
    Applied,
    Ignored,
}

impl Handled {
    pub fn applied(self) -> bool {
        self == Handled::Applied
    }
}
