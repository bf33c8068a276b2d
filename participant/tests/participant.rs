use std::{cell::RefCell, rc::Rc, sync::Arc, time::Duration};

use replicast_participant::{
    AuthorityOutcome, Participant, ParticipantConfig, ParticipantError, ParticipantEvent,
};
use replicast_shared::{
    loopback_link, HostLink, HostMessage, ManualClock, ObjectId, ParticipantId, ParticipantLink,
    ParticipantMessage, ReplicatedValue,
};

const OBJECT: ObjectId = ObjectId::new(5);
const LOCAL: ParticipantId = ParticipantId::new(2);
const OTHER: ParticipantId = ParticipantId::new(1);

fn welcomed() -> (HostLink, Participant<ParticipantLink>, ReplicatedValue<u32>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (host, link) = loopback_link();
    let mut participant = Participant::new(
        ParticipantConfig::default(),
        link,
        Arc::new(ManualClock::new()),
    );
    host.send(&HostMessage::Welcome {
        participant: LOCAL,
        participants: vec![OTHER],
    })
    .expect("welcome");
    participant.fixed_tick().expect("tick");

    let mut builder = participant.builder(OBJECT);
    let score = builder.value("score", 0u32);
    let object = builder.build().expect("build");
    participant.attach_object(object).expect("attach");
    host.send(&HostMessage::AuthorityChanged {
        object: OBJECT,
        holder: Some(OTHER),
        epoch: 1,
    })
    .expect("send");
    participant.fixed_tick().expect("tick");

    (host, participant, score)
}

fn received(host: &HostLink) -> Vec<ParticipantMessage> {
    let mut messages = Vec::new();
    while let Some(message) = host.receive().expect("receive") {
        messages.push(message);
    }
    messages
}

fn grant(host: &HostLink, epoch: u32) {
    host.send(&HostMessage::AuthorityChanged {
        object: OBJECT,
        holder: Some(LOCAL),
        epoch,
    })
    .expect("send");
    host.send(&HostMessage::AuthorityResolved {
        object: OBJECT,
        granted: true,
    })
    .expect("send");
}

#[test]
fn welcome_and_attach() {
    let (host, mut participant, _) = welcomed();

    assert_eq!(participant.local(), Some(LOCAL));
    assert_eq!(participant.master(), Some(OTHER));
    assert!(!participant.is_master());
    assert_eq!(
        received(&host),
        vec![ParticipantMessage::Attach { object: OBJECT }]
    );
    let events: Vec<ParticipantEvent> = participant.take_events().into_iter().collect();
    assert_eq!(events[0], ParticipantEvent::Connected { participant: LOCAL });
}

#[test]
fn granted_task_writes_and_the_write_is_broadcast() {
    let (host, mut participant, score) = welcomed();
    received(&host);

    let request = participant.request_authority(OBJECT).expect("request");
    let outcome = Rc::new(RefCell::new(None));
    let task_outcome = outcome.clone();
    let task_score = score.clone();
    participant
        .spawn(async move {
            let result = request.await;
            if result.is_granted() {
                task_score.write(42).expect("write");
            }
            *task_outcome.borrow_mut() = Some(result);
        })
        .expect("spawn");

    participant.fixed_tick().expect("tick");
    assert_eq!(
        received(&host),
        vec![ParticipantMessage::RequestAuthority { object: OBJECT }]
    );

    grant(&host, 2);
    participant.fixed_tick().expect("tick");

    assert_eq!(*outcome.borrow(), Some(AuthorityOutcome::Granted));
    let messages = received(&host);
    assert_eq!(messages.len(), 1);
    let ParticipantMessage::Broadcast(update) = &messages[0] else {
        panic!("expected a broadcast, got {:?}", messages[0]);
    };
    assert_eq!(update.version.epoch, 2);
}

#[test]
fn release_follows_final_updates() {
    let (host, mut participant, score) = welcomed();
    grant(&host, 2);
    participant.fixed_tick().expect("tick");
    received(&host);

    score.write(7).expect("write");
    host.send(&HostMessage::ReleaseRequested {
        object: OBJECT,
        requester: OTHER,
    })
    .expect("send");
    participant.fixed_tick().expect("tick");

    let messages = received(&host);
    assert_eq!(messages.len(), 2);
    assert!(matches!(messages[0], ParticipantMessage::Broadcast(_)));
    assert_eq!(
        messages[1],
        ParticipantMessage::ReleaseAuthority { object: OBJECT }
    );
    assert!(score.write(8).is_err());
}

#[test]
fn despawn_while_waiting_cancels_without_writing() {
    let (host, mut participant, score) = welcomed();
    let request = participant.request_authority(OBJECT).expect("request");
    let outcome = Rc::new(RefCell::new(None));
    let task_outcome = outcome.clone();
    let task_score = score.clone();
    participant
        .spawn(async move {
            let result = request.await;
            if result.is_granted() {
                task_score.write(1).expect("write");
            }
            *task_outcome.borrow_mut() = Some(result);
        })
        .expect("spawn");
    participant.fixed_tick().expect("tick");

    host.send(&HostMessage::Despawned { object: OBJECT })
        .expect("send");
    participant.fixed_tick().expect("tick");

    assert_eq!(*outcome.borrow(), Some(AuthorityOutcome::Cancelled));
    assert_eq!(score.read(), 0);
    assert!(participant.object(OBJECT).is_none());
}

#[test]
fn despawn_requires_authority() {
    let (_host, mut participant, _) = welcomed();

    assert!(matches!(
        participant.despawn(OBJECT),
        Err(ParticipantError::NotAuthority { .. })
    ));
}

#[test]
fn closed_link_cancels_requests() {
    let (host, mut participant, _) = welcomed();
    let request = participant.request_authority(OBJECT).expect("request");
    let outcome = Rc::new(RefCell::new(None));
    let task_outcome = outcome.clone();
    participant
        .spawn(async move {
            *task_outcome.borrow_mut() = Some(request.await);
        })
        .expect("spawn");

    host.close();
    participant.fixed_tick().expect("tick");
    participant.run_until_stalled();

    assert_eq!(*outcome.borrow(), Some(AuthorityOutcome::Cancelled));
    assert!(!participant.is_connected());
    assert!(participant
        .take_events()
        .iter()
        .any(|event| *event == ParticipantEvent::Disconnected));
}

#[test]
fn frame_runs_due_fixed_ticks() {
    let (_host, mut participant, _) = welcomed();
    let start = participant.tick();

    assert_eq!(participant.frame(Duration::from_millis(50)).expect("frame"), 2);
    assert_eq!(participant.tick(), start.wrapping_add(2));
}

#[test]
fn observation_reports_initial_state_then_changes() {
    let (host, mut participant, score) = welcomed();
    participant.observation_tick(Duration::ZERO).expect("observe");
    participant.take_events();

    grant(&host, 2);
    participant.fixed_tick().expect("tick");
    score.write(3).expect("write");
    participant.observation_tick(Duration::ZERO).expect("observe");

    assert!(participant.take_events().iter().any(|event| matches!(
        event,
        ParticipantEvent::FieldsChanged { object, fields } if *object == OBJECT && fields.len() == 1
    )));
}

#[test]
fn undrained_events_stay_bounded() {
    let (host, mut participant, score) = welcomed();
    grant(&host, 2);
    participant.fixed_tick().expect("tick");
    let capacity = participant.config().event_capacity;

    for value in 0..(capacity as u32 * 4) {
        score.write(value + 1).expect("write");
        participant.fixed_tick().expect("tick");
        participant.observation_tick(Duration::ZERO).expect("observe");
    }

    let events = participant.take_events();
    assert_eq!(events.len(), capacity);
    assert!(events.dropped() > 0);
    assert!(matches!(
        events.iter().last(),
        Some(ParticipantEvent::FieldsChanged { object, .. }) if *object == OBJECT
    ));
    assert!(participant.take_events().is_empty());
}
