use std::{cell::RefCell, rc::Rc};

use replicast_host::HostConfig;
use replicast_participant::{AuthorityOutcome, ParticipantEvent};
use replicast_shared::{LinkConditionerConfig, LogCursor, LogId, ObjectId};
use replicast_test::{
    assert_converged, assert_single_authority, init_logging, TestObject, TestSession,
};

const OBJECT: ObjectId = ObjectId::new(21);

#[test]
fn despawn_during_pending_request_cancels_it() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);

    let request = session
        .participant(1)
        .request_authority(OBJECT)
        .expect("request");
    let outcome = Rc::new(RefCell::new(None));
    let task_outcome = outcome.clone();
    let score = copies[1].score.clone();
    session
        .participant_mut(1)
        .spawn(async move {
            let result = request.await;
            if result.is_granted() {
                score.write(99).expect("write after grant");
            }
            *task_outcome.borrow_mut() = Some(result);
        })
        .expect("spawn");
    session.tick();

    // the host forwards the request, but the holder despawns before it
    // gets to release
    session.tick_only(&[]);
    session.participant_mut(0).despawn(OBJECT).expect("despawn");
    session.exchange(2);

    assert_eq!(*outcome.borrow(), Some(AuthorityOutcome::Cancelled));
    assert_eq!(copies[1].score.read(), 0);
    assert!(!copies[1].object.is_alive());
    assert_eq!(session.host().object_count(), 0);
    assert!(session.participant(1).object(OBJECT).is_none());
}

#[test]
fn late_joiner_catches_up() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);
    copies[0].score.write(8).expect("write");
    copies[0].pads.set(3, true).expect("set");
    copies[0].history.append(30).expect("append");
    session.exchange(2);

    let late = session.connect();
    let late_copy = session.spawn(late, OBJECT);
    session.exchange(2);

    assert_eq!(late_copy.score.read(), 8);
    assert_eq!(late_copy.pads.get(3), Some(true));
    assert_eq!(late_copy.history.latest().map(|entry| entry.payload), Some(30));
    assert_eq!(late_copy.object.holder(), Some(session.id(0)));
    assert_single_authority!(session, OBJECT);

    session.participant_mut(late).take_events();
    session.observe();
    let reported = session
        .participant_mut(late)
        .take_events()
        .into_iter()
        .find_map(|event| match event {
            ParticipantEvent::FieldsChanged { object, fields } if object == OBJECT => Some(fields),
            _ => None,
        })
        .expect("initial state reported");
    assert_eq!(reported.len(), late_copy.object.field_count());
}

#[test]
fn crashed_holder_hands_over_to_master() {
    init_logging();
    let mut session = TestSession::with_participants(3);
    let copies = session.spawn_everywhere(OBJECT);
    copies[0].score.write(4).expect("write");
    session.exchange(2);

    session.participant(0).transport().close();
    session.exchange(2);

    assert_eq!(session.host().holder(OBJECT), Some(session.id(1)));
    assert_eq!(session.authority_holders(OBJECT), vec![session.id(1)]);
    assert!(!session.participant(0).is_connected());
    assert!(!session.participant(1).peers().contains(&session.id(0)));

    copies[1].score.write(5).expect("new holder writes");
    session.exchange(2);
    assert_eq!(copies[2].score.read(), 5);
    assert_eq!(copies[0].score.read(), 4);
}

#[test]
fn duplicated_deliveries_are_harmless() {
    init_logging();
    let mut session = TestSession::new(HostConfig {
        link_conditioner: Some(LinkConditionerConfig::always_duplicate()),
        ..HostConfig::default()
    });
    for _ in 0..3 {
        session.connect();
    }
    let copies = session.spawn_everywhere(OBJECT);
    let mut cursor = LogCursor::new();
    let mut seen: Vec<LogId> = Vec::new();

    for round in 0..6u32 {
        copies[0].score.write(round).expect("write");
        copies[0].history.append(round).expect("append");
        session.tick();
        seen.extend(copies[2].history.consume(&mut cursor).iter().map(|entry| entry.id));
        assert_single_authority!(session, OBJECT);
    }
    session.exchange(2);
    seen.extend(copies[2].history.consume(&mut cursor).iter().map(|entry| entry.id));

    assert_eq!(seen, (1..=6).collect::<Vec<LogId>>());
    assert_converged!(copies, |copy: &TestObject| copy.score.read());
    assert_eq!(copies[1].score.read(), 5);
}

#[test]
fn stale_updates_are_ignored_after_migration() {
    init_logging();
    let mut session = TestSession::with_participants(3);
    let copies = session.spawn_everywhere(OBJECT);
    copies[0].score.write(1).expect("write");
    session.exchange(2);

    let request = session
        .participant(2)
        .request_authority(OBJECT)
        .expect("request");
    let score = copies[2].score.clone();
    session
        .participant_mut(2)
        .spawn(async move {
            if request.await.is_granted() {
                score.write(2).expect("write after grant");
            }
        })
        .expect("spawn");
    session.exchange(6);

    // the former holder can no longer write; its copy follows the new one
    assert!(copies[0].score.write(3).is_err());
    assert_converged!(copies, |copy: &TestObject| copy.score.read());
    assert_eq!(copies[1].score.read(), 2);
    assert_eq!(session.host().epoch(OBJECT), Some(2));
}

#[test]
fn write_after_a_long_idle_still_replicates() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);
    copies[0].score.write(1).expect("write");
    session.exchange(2);
    assert_eq!(copies[1].score.read(), 1);

    // more than half the tick range, so the tick counter wraps past it
    session.exchange(33_000);
    copies[0].score.write(2).expect("write");
    session.exchange(2);

    assert_eq!(copies[1].score.read(), 2);
    let late = session.connect();
    let late_copy = session.spawn(late, OBJECT);
    session.exchange(2);
    assert_eq!(late_copy.score.read(), 2);
}
