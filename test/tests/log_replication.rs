use proptest::prelude::*;

use replicast_shared::{FieldError, LogConfig, LogCursor, LogId, ObjectId};
use replicast_test::{init_logging, TestSession, EVENTS_CAPACITY, HISTORY_CAPACITY};

const OBJECT: ObjectId = ObjectId::new(7);

#[test]
fn appended_entries_replicate_in_order() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);

    let log = &copies[0].history;
    let remote = &copies[1].history;
    for payload in 1..=4u32 {
        log.append(payload).expect("append");
    }
    assert_eq!(log.len(), 4);
    session.exchange(2);

    let (batch, watermark) = remote.consume_new(0);
    let ids: Vec<LogId> = batch.iter().map(|entry| entry.id).collect();
    let payloads: Vec<u32> = batch.iter().map(|entry| entry.payload).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(payloads, vec![1, 2, 3, 4]);
    assert_eq!(watermark, 4);
    assert!(remote.consume_new(watermark).0.is_empty());
}

#[test]
fn bounded_log_evicts_oldest_end_to_end() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let mut builder = session.participant(0).builder(OBJECT);
    let log = builder.log::<u32>("recent", LogConfig::history(3));
    let object = builder.build().expect("build");
    session
        .participant_mut(0)
        .attach_object(object)
        .expect("attach");
    let mut remote_builder = session.participant(1).builder(OBJECT);
    let remote = remote_builder.log::<u32>("recent", LogConfig::history(3));
    let remote_object = remote_builder.build().expect("build");
    session
        .participant_mut(1)
        .attach_object(remote_object)
        .expect("attach");
    session.exchange(2);

    for payload in 1..=4u32 {
        log.append(payload).expect("append");
    }
    session.exchange(2);

    let (batch, watermark) = remote.consume_new(0);
    let payloads: Vec<u32> = batch.iter().map(|entry| entry.payload).collect();
    assert_eq!(payloads, vec![2, 3, 4]);
    assert_eq!(watermark, 4);
    assert!(remote.consume_new(watermark).0.is_empty());
}

#[test]
fn full_event_log_rejects_instead_of_failing() {
    init_logging();
    let mut session = TestSession::with_participants(1);
    let copies = session.spawn_everywhere(OBJECT);
    let events = &copies[0].events;

    for payload in 0..EVENTS_CAPACITY as u32 {
        events.append(payload).expect("append");
    }
    let error = events.append(99).expect_err("full");

    assert!(matches!(error, FieldError::CapacityExceeded { .. }));
    assert_eq!(events.len(), EVENTS_CAPACITY);
    session.exchange(2);
}

#[test]
fn migration_clears_time_relative_logs_only() {
    init_logging();
    let mut session = TestSession::with_participants(3);
    let copies = session.spawn_everywhere(OBJECT);

    copies[0].events.append(1).expect("append");
    copies[0].history.append(10).expect("append");
    copies[0].history.append(11).expect("append");
    session.exchange(2);

    let mut events_cursor = LogCursor::new();
    assert_eq!(copies[2].events.consume(&mut events_cursor).len(), 1);
    assert_eq!(copies[2].history.len(), 2);

    // the holder drops out, authority migrates to the next participant
    session.participant_mut(0).leave().expect("leave");
    session.exchange(3);

    assert_eq!(session.authority_holders(OBJECT), vec![session.id(1)]);
    assert!(copies[1].events.is_empty());
    assert!(copies[2].events.is_empty());
    assert_eq!(copies[2].history.len(), 2);

    copies[1].events.append(2).expect("append");
    let next_history = copies[1].history.append(12).expect("append");
    assert_eq!(next_history, 3);
    session.exchange(2);

    let after: Vec<u32> = copies[2]
        .events
        .consume(&mut events_cursor)
        .into_iter()
        .map(|entry| entry.payload)
        .collect();
    assert_eq!(after, vec![2]);
    assert_eq!(copies[2].history.last_id(), 3);
}

#[test]
fn history_ids_continue_for_a_new_authority() {
    init_logging();
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);
    for payload in 0..HISTORY_CAPACITY as u32 + 2 {
        copies[0].history.append(payload).expect("append");
    }
    session.exchange(2);

    let request = session.participant(1).request_authority(OBJECT).expect("request");
    session
        .participant_mut(1)
        .spawn(async move {
            request.await;
        })
        .expect("spawn");
    session.exchange(4);

    assert!(copies[1].history.has_authority());
    let id = copies[1].history.append(0).expect("append");
    assert_eq!(id, HISTORY_CAPACITY as LogId + 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A remote consumer sees every entry at most once, in ascending id
    /// order, and misses none when the log never overflows between ticks
    #[test]
    fn remote_consumer_sees_entries_exactly_once(
        appends_per_tick in prop::collection::vec(0usize..3, 1..24),
        consume_every in 1usize..3,
    ) {
        let mut session = TestSession::with_participants(2);
        let copies = session.spawn_everywhere(OBJECT);
        let mut cursor = LogCursor::new();
        let mut seen: Vec<LogId> = Vec::new();
        let mut appended = 0u32;

        for (round, count) in appends_per_tick.iter().enumerate() {
            for _ in 0..*count {
                appended += 1;
                copies[0].history.append(appended).expect("append");
            }
            session.tick();
            if round % consume_every == 0 {
                seen.extend(copies[1].history.consume(&mut cursor).iter().map(|entry| entry.id));
            }
        }
        session.exchange(2);
        seen.extend(copies[1].history.consume(&mut cursor).iter().map(|entry| entry.id));

        prop_assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        let per_round_max = appends_per_tick.iter().copied().max().unwrap_or(0) * consume_every;
        if per_round_max <= HISTORY_CAPACITY {
            prop_assert_eq!(seen, (1..=appended).collect::<Vec<LogId>>());
        }
    }
}
