use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};

use replicast_shared::{
    loopback_link, AuthorityEpoch, HostLink, HostMessage, ObjectId, ParticipantId,
    ParticipantLink, ParticipantMessage, TransportError,
};

use crate::{
    conditioner::LinkConditioner,
    error::HostError,
    object::object_record::{ObjectRecord, Outbound},
    HostConfig,
};

struct Connection {
    link: HostLink,
    conditioner: Option<LinkConditioner>,
}

/// Relays replicated field updates between participants and arbitrates who
/// holds authority over each object.
///
/// The host never interprets field payloads. It tracks per object the
/// holder, the authority epoch, a pending transfer and the latest update of
/// every field, which it replays to participants attaching later.
pub struct SessionHost {
    config: HostConfig,
    connections: BTreeMap<ParticipantId, Connection>,
    next_participant: u32,
    objects: HashMap<ObjectId, ObjectRecord>,
}

impl SessionHost {
    /// Create a new SessionHost
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            connections: BTreeMap::new(),
            next_participant: 1,
            objects: HashMap::new(),
        }
    }

    // Participants

    /// Accepts a new participant and returns its end of the link. The
    /// participant is welcomed with its id; everyone else hears it joined.
    pub fn connect(&mut self) -> Result<ParticipantLink, HostError> {
        let participant = ParticipantId::new(self.next_participant);
        self.next_participant = self
            .next_participant
            .checked_add(1)
            .ok_or(HostError::ParticipantIdsExhausted)?;

        let (host_link, participant_link) = loopback_link();
        let conditioner = self
            .config
            .link_conditioner
            .map(|config| LinkConditioner::new(config, u64::from(participant.value())));
        let existing: Vec<ParticipantId> = self.connections.keys().copied().collect();
        self.connections.insert(
            participant,
            Connection {
                link: host_link,
                conditioner,
            },
        );
        info!("{} connected", participant);

        let mut outbound = vec![Outbound {
            to: participant,
            message: HostMessage::Welcome {
                participant,
                participants: existing.clone(),
            },
        }];
        outbound.extend(existing.into_iter().map(|other| Outbound {
            to: other,
            message: HostMessage::ParticipantJoined { participant },
        }));
        self.deliver(outbound);

        Ok(participant_link)
    }

    /// Removes a participant as if it had left
    ///
    /// # Panics
    ///
    /// Panics if the participant is not connected.
    /// Consider using `try_disconnect` for non-panicking error handling.
    pub fn disconnect(&mut self, participant: ParticipantId) {
        self.try_disconnect(participant)
            .expect("Participant must be connected before it can be disconnected!")
    }

    /// Removes a participant as if it had left
    ///
    /// Returns an error if the participant is not connected.
    pub fn try_disconnect(&mut self, participant: ParticipantId) -> Result<(), HostError> {
        if !self.connections.contains_key(&participant) {
            return Err(HostError::UnknownParticipant {
                participant,
                operation: "disconnect",
            });
        }
        self.remove_participant(participant);
        Ok(())
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.connections.keys().copied().collect()
    }

    pub fn is_connected(&self, participant: ParticipantId) -> bool {
        self.connections.contains_key(&participant)
    }

    /// The connected participant with the lowest id
    pub fn master(&self) -> Option<ParticipantId> {
        self.connections.keys().next().copied()
    }

    // Objects

    pub fn holder(&self, object: ObjectId) -> Option<ParticipantId> {
        self.objects.get(&object).and_then(|record| record.holder())
    }

    pub fn epoch(&self, object: ObjectId) -> Option<AuthorityEpoch> {
        self.objects.get(&object).map(|record| record.epoch())
    }

    pub fn object(&self, object: ObjectId) -> Option<&ObjectRecord> {
        self.objects.get(&object)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // Update

    /// Processes every message waiting on every link. Returns the number of
    /// messages handled.
    pub fn update(&mut self) -> usize {
        let mut handled = 0;
        let participants: Vec<ParticipantId> = self.connections.keys().copied().collect();

        for participant in participants {
            loop {
                let Some(connection) = self.connections.get(&participant) else {
                    break;
                };
                let received = connection.link.receive();
                let link_open = connection.link.is_open();
                match received {
                    Ok(Some(message)) => {
                        handled += 1;
                        self.handle_message(participant, message);
                    }
                    Ok(None) => {
                        if !link_open {
                            info!("link of {} closed", participant);
                            self.remove_participant(participant);
                        }
                        break;
                    }
                    Err(TransportError::Codec(error)) => {
                        warn!("dropping unreadable message from {}: {}", participant, error);
                    }
                    Err(error) => {
                        warn!("could not read from {}: {}", participant, error);
                        break;
                    }
                }
            }
        }

        handled
    }

    fn handle_message(&mut self, sender: ParticipantId, message: ParticipantMessage) {
        debug!("{} -> host: {}", sender, message.name());
        let outbound = match message {
            ParticipantMessage::Attach { object } => match self.objects.get_mut(&object) {
                Some(record) => record.attach(sender),
                None => {
                    let (record, outbound) = ObjectRecord::new(object, sender);
                    self.objects.insert(object, record);
                    outbound
                }
            },
            ParticipantMessage::Broadcast(update) => match self.objects.get_mut(&update.object) {
                Some(record) => record.broadcast(sender, update),
                None => {
                    warn!("{} broadcast for unknown {}", sender, update.object);
                    Vec::new()
                }
            },
            ParticipantMessage::RequestAuthority { object } => {
                let policy = self.config.authority_policy;
                match self.objects.get_mut(&object) {
                    Some(record) => record.request(sender, policy),
                    None => {
                        warn!("{} requested unknown {}", sender, object);
                        vec![Outbound {
                            to: sender,
                            message: HostMessage::AuthorityResolved {
                                object,
                                granted: false,
                            },
                        }]
                    }
                }
            }
            ParticipantMessage::ReleaseAuthority { object } => match self.objects.get_mut(&object) {
                Some(record) => record.release(sender),
                None => Vec::new(),
            },
            ParticipantMessage::Despawn { object } => self.despawn(sender, object),
            ParticipantMessage::Leave => {
                self.remove_participant(sender);
                Vec::new()
            }
        };
        self.deliver(outbound);
    }

    fn despawn(&mut self, sender: ParticipantId, object: ObjectId) -> Vec<Outbound> {
        let Some(record) = self.objects.get(&object) else {
            debug!("{} despawned unknown {}", sender, object);
            return Vec::new();
        };
        if !record.may_despawn(sender) {
            warn!(
                "{} may not despawn {} held by {:?}",
                sender,
                object,
                record.holder()
            );
            return Vec::new();
        }
        info!("{} despawned {}", sender, object);
        let outbound = record.despawned();
        self.objects.remove(&object);
        outbound
    }

    fn remove_participant(&mut self, participant: ParticipantId) {
        let Some(connection) = self.connections.remove(&participant) else {
            return;
        };
        connection.link.close();
        info!("{} left", participant);

        let mut object_ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        object_ids.sort();
        let mut outbound = Vec::new();
        for object in object_ids {
            if let Some(record) = self.objects.get_mut(&object) {
                outbound.extend(record.remove_participant(participant));
            }
        }
        outbound.extend(self.connections.keys().map(|other| Outbound {
            to: *other,
            message: HostMessage::ParticipantLeft { participant },
        }));
        self.deliver(outbound);
    }

    fn deliver(&mut self, outbound: Vec<Outbound>) {
        let mut closed = Vec::new();
        for Outbound { to, message } in outbound {
            let Some(connection) = self.connections.get_mut(&to) else {
                debug!("dropping {} for departed {}", message.name(), to);
                continue;
            };
            let bytes = match HostLink::encode(&message) {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!("could not encode {} for {}: {}", message.name(), to, error);
                    continue;
                }
            };
            let copies = connection
                .conditioner
                .as_mut()
                .map_or(1, |conditioner| conditioner.copies());
            for _ in 0..copies {
                if let Err(error) = connection.link.send_encoded(bytes.clone()) {
                    if error.is_closed() {
                        closed.push(to);
                    } else {
                        warn!("could not send {} to {}: {}", message.name(), to, error);
                    }
                    break;
                }
            }
        }
        for participant in closed {
            self.remove_participant(participant);
        }
    }
}

impl Default for SessionHost {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}
