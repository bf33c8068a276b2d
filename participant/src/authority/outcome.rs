/// How an authority request ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthorityOutcome {
    /// The local participant holds authority; writes will be accepted
    Granted,
    /// The host refused, or another requester superseded this one
    Denied,
    /// The object was despawned, or the participant left, while waiting
    Cancelled,
    /// The caller's tick budget ran out before a grant arrived
    TimedOut,
}

impl AuthorityOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AuthorityOutcome::Granted)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthorityOutcome::Granted => "Granted",
            AuthorityOutcome::Denied => "Denied",
            AuthorityOutcome::Cancelled => "Cancelled",
            AuthorityOutcome::TimedOut => "TimedOut",
        }
    }
}

impl From<AuthorityOutcome> for bool {
    fn from(outcome: AuthorityOutcome) -> Self {
        outcome.is_granted()
    }
}
