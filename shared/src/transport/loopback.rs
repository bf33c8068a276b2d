//! In-process link routing encoded messages between a participant and the
//! host without network I/O.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use log::{debug, trace};

use crate::{
    codec,
    messages::{HostMessage, ParticipantMessage},
    transport::{error::TransportError, Transport},
    types::ParticipantId,
};

type Queue = Arc<Mutex<VecDeque<Vec<u8>>>>;

#[derive(Clone)]
struct LinkShared {
    to_host: Queue,
    to_participant: Queue,
    open: Arc<Mutex<bool>>,
}

impl LinkShared {
    fn is_open(&self) -> bool {
        self.open.lock().map(|open| *open).unwrap_or(false)
    }

    fn close(&self) {
        if let Ok(mut open) = self.open.lock() {
            *open = false;
        }
    }

    fn push(queue: &Queue, bytes: Vec<u8>) -> Result<(), TransportError> {
        queue
            .lock()
            .map_err(|_| TransportError::LockPoisoned)?
            .push_back(bytes);
        Ok(())
    }

    fn pop(queue: &Queue) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(queue
            .lock()
            .map_err(|_| TransportError::LockPoisoned)?
            .pop_front())
    }
}

/// Creates a connected pair of link ends
pub fn loopback_link() -> (HostLink, ParticipantLink) {
    let shared = LinkShared {
        to_host: Arc::new(Mutex::new(VecDeque::new())),
        to_participant: Arc::new(Mutex::new(VecDeque::new())),
        open: Arc::new(Mutex::new(true)),
    };
    (
        HostLink {
            shared: shared.clone(),
        },
        ParticipantLink {
            shared,
            local: None,
        },
    )
}

/// Host end of a loopback link
pub struct HostLink {
    shared: LinkShared,
}

impl HostLink {
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn close(&self) {
        self.shared.close();
    }

    /// Encodes a message for this link. Use with [`send_encoded`](Self::send_encoded)
    /// to deliver the same bytes more than once.
    pub fn encode(message: &HostMessage) -> Result<Vec<u8>, TransportError> {
        Ok(codec::encode(message.name(), message)?)
    }

    pub fn send(&self, message: &HostMessage) -> Result<(), TransportError> {
        self.send_encoded(Self::encode(message)?)
    }

    pub fn send_encoded(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.shared.is_open() {
            return Err(TransportError::LinkClosed {
                side: "participant",
                operation: "send",
            });
        }
        LinkShared::push(&self.shared.to_participant, bytes)
    }

    /// Next message from the participant. Messages queued before the link
    /// closed are still delivered.
    pub fn receive(&self) -> Result<Option<ParticipantMessage>, TransportError> {
        let Some(bytes) = LinkShared::pop(&self.shared.to_host)? else {
            return Ok(None);
        };
        let message: ParticipantMessage = codec::decode("participant message", &bytes)?;
        trace!("host received {}", message.name());
        Ok(Some(message))
    }
}

/// Participant end of a loopback link
pub struct ParticipantLink {
    shared: LinkShared,
    local: Option<ParticipantId>,
}

impl ParticipantLink {
    /// Closes the link without a goodbye, as a crashed participant would
    pub fn close(&self) {
        debug!("participant link {:?} closed", self.local);
        self.shared.close();
    }
}

impl Transport for ParticipantLink {
    fn local_participant(&self) -> Option<ParticipantId> {
        self.local
    }

    fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    fn send(&mut self, message: ParticipantMessage) -> Result<(), TransportError> {
        if !self.shared.is_open() {
            return Err(TransportError::LinkClosed {
                side: "host",
                operation: "send",
            });
        }
        let bytes = codec::encode(message.name(), &message)?;
        LinkShared::push(&self.shared.to_host, bytes)
    }

    fn receive(&mut self) -> Result<Option<HostMessage>, TransportError> {
        let Some(bytes) = LinkShared::pop(&self.shared.to_participant)? else {
            return Ok(None);
        };
        let message: HostMessage = codec::decode("host message", &bytes)?;
        if let HostMessage::Welcome { participant, .. } = &message {
            self.local = Some(*participant);
        }
        Ok(Some(message))
    }
}
