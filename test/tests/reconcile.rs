use replicast_participant::{LocalEffect, Reconciler, StatusChange, Tempo};
use replicast_shared::ObjectId;
use replicast_test::{init_logging, TestSession};

const OBJECT: ObjectId = ObjectId::new(3);
const PAD: u8 = 1;

/// A one-shot that plays for `length` passes
struct OneShot {
    length: u32,
    remaining: u32,
    starts: u32,
}

impl OneShot {
    fn new(length: u32) -> Self {
        Self {
            length,
            remaining: 0,
            starts: 0,
        }
    }

    fn advance(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}

impl LocalEffect for OneShot {
    fn is_playing(&self) -> bool {
        self.remaining > 0
    }

    fn is_looping(&self) -> bool {
        false
    }

    fn start(&mut self) {
        self.remaining = self.length;
        self.starts += 1;
    }

    fn stop(&mut self) {
        self.remaining = 0;
    }
}

#[test]
fn finished_one_shot_converges_to_inactive_everywhere() {
    init_logging();
    const LENGTH: u32 = 3;
    let mut session = TestSession::with_participants(2);
    let copies = session.spawn_everywhere(OBJECT);
    let mut reconcilers: Vec<Reconciler<u8, OneShot>> = copies
        .iter()
        .map(|copy| {
            let mut reconciler = Reconciler::new(copy.pads.clone(), Tempo::default());
            reconciler.register_effect(PAD, OneShot::new(LENGTH));
            reconciler
        })
        .collect();

    copies[0].pads.set(PAD, true).expect("holder triggers the pad");
    let mut authority_changes = Vec::new();
    for _ in 0..LENGTH + 4 {
        session.tick();
        for (index, reconciler) in reconcilers.iter_mut().enumerate() {
            let changes = reconciler.reconcile(1.0).expect("pass");
            if index == 0 {
                authority_changes.extend(changes);
            }
            if let Some(effect) = reconciler.effect_mut(PAD) {
                effect.advance();
            }
        }
    }
    session.exchange(2);

    assert_eq!(copies[0].pads.get(PAD), Some(false));
    assert_eq!(copies[1].pads.get(PAD), Some(false));
    assert_eq!(
        authority_changes,
        vec![
            StatusChange { key: PAD, active: true },
            StatusChange {
                key: PAD,
                active: false
            },
        ]
    );
    assert_eq!(reconcilers[0].effect(PAD).map(|effect| effect.starts), Some(1));
}
