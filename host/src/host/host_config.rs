use std::default::Default;

use replicast_shared::LinkConditionerConfig;

/// How the host answers a request for an object someone else holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AuthorityPolicy {
    /// Ask the holder to release, then hand authority to the newest
    /// requester
    #[default]
    AllowTransfer,
    /// Refuse while the object is held
    Exclusive,
}

/// Contains Config properties which will be used by the SessionHost
#[derive(Clone, Debug, Default)]
pub struct HostConfig {
    pub authority_policy: AuthorityPolicy,
    /// Degrades every outgoing link, for exercising redundant delivery
    pub link_conditioner: Option<LinkConditionerConfig>,
}
