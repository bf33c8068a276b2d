use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use replicast_shared::{
    AuthorityEpoch, FieldId, FieldUpdate, HostMessage, ObjectId, ParticipantId,
};

use crate::host::host_config::AuthorityPolicy;

/// A message the host must deliver to one participant
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub to: ParticipantId,
    pub message: HostMessage,
}

impl Outbound {
    fn new(to: ParticipantId, message: HostMessage) -> Self {
        Self { to, message }
    }
}

/// Everything the host knows about one replicated object
#[derive(Debug)]
pub struct ObjectRecord {
    id: ObjectId,
    holder: Option<ParticipantId>,
    epoch: AuthorityEpoch,
    pending: Option<ParticipantId>,
    attached: BTreeSet<ParticipantId>,
    // latest accepted state per field, replayed to late joiners
    fields: BTreeMap<FieldId, FieldUpdate>,
}

impl ObjectRecord {
    /// Creates the record for an object first attached by `owner`, who
    /// becomes its holder
    pub fn new(id: ObjectId, owner: ParticipantId) -> (Self, Vec<Outbound>) {
        let mut attached = BTreeSet::new();
        attached.insert(owner);
        let record = Self {
            id,
            holder: Some(owner),
            epoch: 1,
            pending: None,
            attached,
            fields: BTreeMap::new(),
        };
        info!("{} attached first by {}, which holds it", id, owner);
        let outbound = vec![Outbound::new(owner, record.authority_message())];
        (record, outbound)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn holder(&self) -> Option<ParticipantId> {
        self.holder
    }

    pub fn epoch(&self) -> AuthorityEpoch {
        self.epoch
    }

    pub fn pending(&self) -> Option<ParticipantId> {
        self.pending
    }

    pub fn is_attached(&self, participant: ParticipantId) -> bool {
        self.attached.contains(&participant)
    }

    pub fn attached(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.attached.iter().copied()
    }

    pub fn latest_update(&self, field: FieldId) -> Option<&FieldUpdate> {
        self.fields.get(&field)
    }

    fn authority_message(&self) -> HostMessage {
        HostMessage::AuthorityChanged {
            object: self.id,
            holder: self.holder,
            epoch: self.epoch,
        }
    }

    fn to_attached(&self, message: HostMessage) -> Vec<Outbound> {
        self.attached
            .iter()
            .map(|participant| Outbound::new(*participant, message.clone()))
            .collect()
    }

    fn resolved(&self, to: ParticipantId, granted: bool) -> Outbound {
        Outbound::new(
            to,
            HostMessage::AuthorityResolved {
                object: self.id,
                granted,
            },
        )
    }

    fn set_holder(&mut self, holder: Option<ParticipantId>) -> Vec<Outbound> {
        self.holder = holder;
        self.epoch += 1;
        match holder {
            Some(holder) => info!("{} now held by {} (epoch {})", self.id, holder, self.epoch),
            None => info!("{} has no holder (epoch {})", self.id, self.epoch),
        }
        self.to_attached(self.authority_message())
    }

    /// A later attacher catches up: authority first, then the latest state of
    /// every field
    pub fn attach(&mut self, participant: ParticipantId) -> Vec<Outbound> {
        self.attached.insert(participant);
        let mut outbound = vec![Outbound::new(participant, self.authority_message())];
        outbound.extend(
            self.fields
                .values()
                .map(|update| Outbound::new(participant, HostMessage::FieldChanged(update.clone()))),
        );
        debug!(
            "{} attached {}, replaying {} fields",
            participant,
            self.id,
            self.fields.len()
        );
        outbound
    }

    pub fn request(&mut self, requester: ParticipantId, policy: AuthorityPolicy) -> Vec<Outbound> {
        if !self.attached.contains(&requester) {
            warn!("{} requested {} without attaching it", requester, self.id);
            return vec![self.resolved(requester, false)];
        }

        match self.holder {
            Some(holder) if holder == requester => vec![self.resolved(requester, true)],
            None => {
                let mut outbound = self.set_holder(Some(requester));
                outbound.push(self.resolved(requester, true));
                outbound
            }
            Some(holder) => match policy {
                AuthorityPolicy::Exclusive => {
                    debug!("{} denied {}: held by {}", requester, self.id, holder);
                    vec![self.resolved(requester, false)]
                }
                AuthorityPolicy::AllowTransfer => {
                    let mut outbound = Vec::new();
                    match self.pending {
                        Some(pending) if pending == requester => return outbound,
                        Some(superseded) => {
                            debug!("{} superseded {} on {}", requester, superseded, self.id);
                            outbound.push(self.resolved(superseded, false));
                        }
                        None => {}
                    }
                    self.pending = Some(requester);
                    outbound.push(Outbound::new(
                        holder,
                        HostMessage::ReleaseRequested {
                            object: self.id,
                            requester,
                        },
                    ));
                    outbound
                }
            },
        }
    }

    /// The holder gave authority back, after its final updates
    pub fn release(&mut self, participant: ParticipantId) -> Vec<Outbound> {
        if self.holder != Some(participant) {
            warn!(
                "{} released {} which it does not hold (holder {:?})",
                participant, self.id, self.holder
            );
            return Vec::new();
        }

        match self.pending.take() {
            Some(requester) => {
                let mut outbound = self.set_holder(Some(requester));
                outbound.push(self.resolved(requester, true));
                outbound
            }
            None => self.set_holder(None),
        }
    }

    /// Stores and relays an update. Only the holder, writing under the
    /// current epoch, is listened to.
    pub fn broadcast(&mut self, sender: ParticipantId, update: FieldUpdate) -> Vec<Outbound> {
        if self.holder != Some(sender) || update.version.epoch != self.epoch {
            warn!(
                "dropping update of field {} on {} from {} at epoch {} (holder {:?}, epoch {})",
                update.field, self.id, sender, update.version.epoch, self.holder, self.epoch
            );
            return Vec::new();
        }

        let outbound = self
            .attached
            .iter()
            .filter(|participant| **participant != sender)
            .map(|participant| {
                Outbound::new(*participant, HostMessage::FieldChanged(update.clone()))
            })
            .collect();
        let newer = self
            .fields
            .get(&update.field)
            .map_or(true, |stored| update.version.is_newer_than(&stored.version));
        if newer {
            self.fields.insert(update.field, update);
        }
        outbound
    }

    /// Whether `participant` may despawn the object
    pub fn may_despawn(&self, participant: ParticipantId) -> bool {
        match self.holder {
            Some(holder) => holder == participant,
            None => self.attached.contains(&participant),
        }
    }

    pub fn despawned(&self) -> Vec<Outbound> {
        self.to_attached(HostMessage::Despawned { object: self.id })
    }

    /// Forgets a departed participant. Its objects migrate to the pending
    /// requester, else to the lowest remaining id (the master), else to
    /// nobody.
    pub fn remove_participant(&mut self, participant: ParticipantId) -> Vec<Outbound> {
        self.attached.remove(&participant);
        if self.pending == Some(participant) {
            self.pending = None;
        }
        if self.holder != Some(participant) {
            return Vec::new();
        }

        match self.pending.take() {
            Some(requester) => {
                let mut outbound = self.set_holder(Some(requester));
                outbound.push(self.resolved(requester, true));
                outbound
            }
            None => {
                let master = self.attached.iter().next().copied();
                self.set_holder(master)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use replicast_shared::{
        FieldId, FieldUpdate, FieldVersion, HostMessage, ObjectId, ParticipantId,
    };

    use super::{ObjectRecord, Outbound};
    use crate::host::host_config::AuthorityPolicy;

    const OBJECT: ObjectId = ObjectId::new(1);
    const A: ParticipantId = ParticipantId::new(1);
    const B: ParticipantId = ParticipantId::new(2);
    const C: ParticipantId = ParticipantId::new(3);

    fn record_with(participants: &[ParticipantId]) -> ObjectRecord {
        let (mut record, _) = ObjectRecord::new(OBJECT, participants[0]);
        for participant in &participants[1..] {
            record.attach(*participant);
        }
        record
    }

    fn update(field: u8, epoch: u32, sequence: u64) -> FieldUpdate {
        FieldUpdate {
            object: OBJECT,
            field: FieldId::new(field),
            version: FieldVersion::new(epoch, sequence),
            tick: 0,
            payload: vec![field, sequence as u8],
        }
    }

    #[test]
    fn first_attacher_holds() {
        let (record, outbound) = ObjectRecord::new(OBJECT, A);
        assert_eq!(record.holder(), Some(A));
        assert_eq!(record.epoch(), 1);
        assert_eq!(
            outbound,
            vec![Outbound {
                to: A,
                message: HostMessage::AuthorityChanged {
                    object: OBJECT,
                    holder: Some(A),
                    epoch: 1
                }
            }]
        );
    }

    #[test]
    fn transfer_waits_for_release() {
        let mut record = record_with(&[A, B]);

        let outbound = record.request(B, AuthorityPolicy::AllowTransfer);
        assert_eq!(
            outbound,
            vec![Outbound {
                to: A,
                message: HostMessage::ReleaseRequested {
                    object: OBJECT,
                    requester: B
                }
            }]
        );
        assert_eq!(record.holder(), Some(A));

        let outbound = record.release(A);
        assert_eq!(record.holder(), Some(B));
        assert_eq!(record.epoch(), 2);
        assert!(outbound.contains(&Outbound {
            to: B,
            message: HostMessage::AuthorityResolved {
                object: OBJECT,
                granted: true
            }
        }));
    }

    #[test]
    fn newer_requester_supersedes_pending_one() {
        let mut record = record_with(&[A, B, C]);

        record.request(B, AuthorityPolicy::AllowTransfer);
        let outbound = record.request(C, AuthorityPolicy::AllowTransfer);

        assert!(outbound.contains(&Outbound {
            to: B,
            message: HostMessage::AuthorityResolved {
                object: OBJECT,
                granted: false
            }
        }));
        assert_eq!(record.pending(), Some(C));
    }

    #[test]
    fn exclusive_policy_denies_while_held() {
        let mut record = record_with(&[A, B]);
        let outbound = record.request(B, AuthorityPolicy::Exclusive);
        assert_eq!(
            outbound,
            vec![Outbound {
                to: B,
                message: HostMessage::AuthorityResolved {
                    object: OBJECT,
                    granted: false
                }
            }]
        );
    }

    #[test]
    fn only_holder_at_current_epoch_is_relayed() {
        let mut record = record_with(&[A, B]);

        assert!(record.broadcast(B, update(0, 1, 1)).is_empty());
        assert!(record.broadcast(A, update(0, 0, 1)).is_empty());

        let outbound = record.broadcast(A, update(0, 1, 2));
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].to, B);
        assert_eq!(record.latest_update(FieldId::new(0)), Some(&update(0, 1, 2)));
    }

    #[test]
    fn late_joiner_gets_authority_before_fields() {
        let mut record = record_with(&[A]);
        record.broadcast(A, update(1, 1, 4));
        record.broadcast(A, update(0, 1, 5));

        let outbound = record.attach(C);

        assert_eq!(outbound.len(), 3);
        assert!(matches!(
            outbound[0].message,
            HostMessage::AuthorityChanged { .. }
        ));
        assert_eq!(outbound[1].message, HostMessage::FieldChanged(update(0, 1, 5)));
        assert_eq!(outbound[2].message, HostMessage::FieldChanged(update(1, 1, 4)));
    }

    #[test]
    fn leaving_holder_hands_over_to_pending_then_master() {
        let mut record = record_with(&[A, B, C]);
        record.request(C, AuthorityPolicy::AllowTransfer);

        record.remove_participant(A);
        assert_eq!(record.holder(), Some(C));

        record.remove_participant(C);
        assert_eq!(record.holder(), Some(B));

        record.remove_participant(B);
        assert_eq!(record.holder(), None);
        assert_eq!(record.epoch(), 4);
    }
}
