use std::{cell::RefCell, rc::Rc};

use proptest::prelude::*;

use replicast_host::{AuthorityPolicy, HostConfig};
use replicast_participant::{AuthorityOutcome, AuthorityRequest, LatestRequest};
use replicast_shared::{LinkConditionerConfig, ObjectId};
use replicast_test::{
    assert_converged, assert_single_authority, init_logging, TestObject, TestSession,
};

const OBJECT: ObjectId = ObjectId::new(40);

type Outcome = Rc<RefCell<Option<AuthorityOutcome>>>;

/// Spawns a task on participant `index` awaiting `request`, writing `value`
/// if granted
fn await_and_write(
    session: &mut TestSession,
    index: usize,
    request: AuthorityRequest,
    copy: &TestObject,
    value: u32,
) -> Outcome {
    let outcome: Outcome = Rc::new(RefCell::new(None));
    let task_outcome = outcome.clone();
    let score = copy.score.clone();
    session
        .participant_mut(index)
        .spawn(async move {
            let result = request.await;
            if result.is_granted() {
                // a release request may already have arrived in the same tick
                let _ = score.write(value);
            }
            *task_outcome.borrow_mut() = Some(result);
        })
        .expect("spawn");
    outcome
}

fn request_and_write(session: &mut TestSession, index: usize, copy: &TestObject, value: u32) -> Outcome {
    let request = session
        .participant(index)
        .request_authority(copy.id())
        .expect("request");
    await_and_write(session, index, request, copy, value)
}

#[test]
fn first_attacher_holds_and_others_follow() {
    init_logging();
    let mut session = TestSession::with_participants(3);
    let copies = session.spawn_everywhere(OBJECT);

    assert_eq!(session.authority_holders(OBJECT), vec![session.id(0)]);
    copies[0].score.write(12).expect("holder writes");
    assert!(copies[1].score.write(13).is_err());

    session.exchange(2);
    assert_converged!(copies, |copy: &TestObject| copy.score.read());
    assert_eq!(copies[2].score.read(), 12);
}

#[test]
fn transfer_hands_over_after_final_update() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);

    copies[0].score.write(5).expect("write");
    let outcome = request_and_write(&mut session, 1, &copies[1], 6);
    for _ in 0..4 {
        session.tick();
        assert_single_authority!(session, OBJECT);
    }

    assert_eq!(*outcome.borrow(), Some(AuthorityOutcome::Granted));
    assert_eq!(session.host().holder(OBJECT), Some(session.id(1)));
    assert_eq!(session.host().epoch(OBJECT), Some(2));
    session.exchange(2);
    assert_converged!(copies, |copy: &TestObject| copy.score.read());
    assert_eq!(copies[0].score.read(), 6);
}

#[test]
fn exclusive_policy_denies() {
    init_logging();
    let mut session = TestSession::new(HostConfig {
        authority_policy: AuthorityPolicy::Exclusive,
        ..HostConfig::default()
    });
    session.connect();
    session.connect();
    let copies = session.spawn_everywhere(OBJECT);

    let outcome = request_and_write(&mut session, 1, &copies[1], 9);
    session.exchange(3);

    assert_eq!(*outcome.borrow(), Some(AuthorityOutcome::Denied));
    assert_eq!(copies[0].score.read(), 0);
    assert_eq!(session.authority_holders(OBJECT), vec![session.id(0)]);
}

#[test]
fn concurrent_requests_coalesce_and_latest_value_wins() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);
    let staged = LatestRequest::new();

    for value in [20u32, 90] {
        staged.stage(value);
        let request = session
            .participant(1)
            .request_authority(OBJECT)
            .expect("request");
        let staged = staged.clone();
        let score = copies[1].score.clone();
        session
            .participant_mut(1)
            .spawn(async move {
                if request.await.is_granted() {
                    if let Some(value) = staged.take() {
                        score.write(value).expect("write after grant");
                    }
                }
            })
            .expect("spawn");
    }
    assert_eq!(session.participant(1).negotiator().pending_count(), 1);

    session.exchange(6);

    assert!(!staged.is_staged());
    assert_converged!(copies, |copy: &TestObject| copy.score.read());
    assert_eq!(copies[0].score.read(), 90);
}

#[test]
fn watchdog_gives_up_on_a_stalled_holder() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);

    let request = session
        .participant(1)
        .negotiator()
        .request_authority_within(&copies[1].object, 3);
    let outcome = await_and_write(&mut session, 1, request, &copies[1], 1);
    for _ in 0..4 {
        session.tick_only(&[1]);
    }

    assert_eq!(*outcome.borrow(), Some(AuthorityOutcome::TimedOut));
    assert!(session.participant(1).negotiator().is_pending(OBJECT));
    assert_eq!(copies[1].score.read(), 0);

    // the holder wakes up and the request still goes through
    session.exchange(4);
    assert_eq!(session.authority_holders(OBJECT), vec![session.id(1)]);
}

#[test]
fn holder_request_resolves_at_once() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);

    let outcome = request_and_write(&mut session, 0, &copies[0], 3);
    session.participant_mut(0).run_until_stalled();

    assert_eq!(*outcome.borrow(), Some(AuthorityOutcome::Granted));
    assert_eq!(copies[0].score.read(), 3);
    assert_eq!(session.participant(0).negotiator().pending_count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// However requests interleave, at most one participant writes at a time
    #[test]
    fn single_authority_under_contention(
        schedule in prop::collection::vec(prop::collection::vec(0usize..3, 0..3), 1..16),
        duplicate in any::<bool>(),
    ) {
        let config = HostConfig {
            link_conditioner: duplicate.then(LinkConditionerConfig::always_duplicate),
            ..HostConfig::default()
        };
        let mut session = TestSession::new(config);
        for _ in 0..3 {
            session.connect();
        }
        let copies = session.spawn_everywhere(OBJECT);

        let mut value = 0u32;
        for requesters in schedule {
            for index in requesters {
                value += 1;
                request_and_write(&mut session, index, &copies[index], value);
            }
            session.tick();
            assert_single_authority!(session, OBJECT);
        }

        session.exchange(8);
        assert_single_authority!(session, OBJECT);
        let holders = session.authority_holders(OBJECT);
        prop_assert_eq!(holders, session.host().holder(OBJECT).into_iter().collect::<Vec<_>>());
        assert_converged!(copies, |copy: &TestObject| copy.score.read());
    }
}
