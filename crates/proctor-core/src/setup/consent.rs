//! Candidate consent.

/// Holds the candidate's consent to being monitored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsentGate {
    given: bool,
}

impl ConsentGate {
    /// Creates a gate with consent withheld.
    #[must_use]
    pub const fn new() -> Self {
        Self { given: false }
    }

    /// Records the candidate's answer.
    pub fn set_consent(&mut self, given: bool) {
        self.given = given;
    }

    /// Returns `true` once consent has been given.
    #[must_use]
    pub const fn is_given(&self) -> bool {
        self.given
    }
}
