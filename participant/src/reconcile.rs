//! Convergence between replicated on/off state and the local effects it
//! drives.

use std::{collections::HashMap, hash::Hash, time::Duration};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};

use replicast_shared::{FieldError, ReplicatedMap};

/// Something local that a replicated flag switches on and off
pub trait LocalEffect {
    fn is_playing(&self) -> bool;

    /// Looping effects keep playing until stopped; one-shots end by
    /// themselves
    fn is_looping(&self) -> bool;

    fn start(&mut self);

    fn stop(&mut self);

    fn set_gain(&mut self, _gain: f32) {}
}

/// Musical tempo the reconciliation period is derived from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tempo {
    pub bpm: u32,
    pub frames_between_checks: u32,
}

impl Tempo {
    pub fn new(bpm: u32, frames_between_checks: u32) -> Self {
        Self {
            bpm,
            frames_between_checks,
        }
    }

    /// `frames * 1000 / bpm` milliseconds. A zero tempo checks every pass.
    pub fn period(&self) -> Duration {
        if self.bpm == 0 {
            return Duration::ZERO;
        }
        let millis = u64::from(self.frames_between_checks) * 1000 / u64::from(self.bpm);
        Duration::from_millis(millis)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(123, 5)
    }
}

/// A key whose local effect started or stopped during a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange<K> {
    pub key: K,
    pub active: bool,
}

/// Applies the rules for one key and returns the state it should now have.
///
/// An idle one-shot that was active before has finished, so the desired
/// state flips to off instead of restarting it.
pub fn sync_effect<E: LocalEffect + ?Sized>(effect: &mut E, was_active: bool, desired: bool) -> bool {
    let playing = effect.is_playing();
    if desired && !playing {
        if effect.is_looping() || !was_active {
            effect.start();
            return true;
        }
        return false;
    }
    if !desired && playing {
        effect.stop();
    }
    desired
}

/// Periodically drives registered effects toward a replicated
/// `ReplicatedMap<K, bool>`.
///
/// Every participant runs its own reconciler. Only the one holding
/// authority writes corrections (a finished one-shot flipped back to off)
/// into the map; the others follow the replicated state.
pub struct Reconciler<K, E> {
    desired: ReplicatedMap<K, bool>,
    effects: HashMap<K, E>,
    observed: HashMap<K, bool>,
    period: Duration,
    elapsed: Duration,
}

impl<K, E> Reconciler<K, E>
where
    K: Copy + Eq + Hash + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    E: LocalEffect,
{
    pub fn new(desired: ReplicatedMap<K, bool>, tempo: Tempo) -> Self {
        Self {
            desired,
            effects: HashMap::new(),
            observed: HashMap::new(),
            period: tempo.period(),
            elapsed: Duration::ZERO,
        }
    }

    /// Registers the effect driven by `key`, returning the one it replaces
    pub fn register_effect(&mut self, key: K, effect: E) -> Option<E> {
        self.effects.insert(key, effect)
    }

    pub fn effect(&self, key: K) -> Option<&E> {
        self.effects.get(&key)
    }

    pub fn effect_mut(&mut self, key: K) -> Option<&mut E> {
        self.effects.get_mut(&key)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.period = tempo.period();
    }

    /// Whether the effect of `key` was active after the last pass
    pub fn is_active(&self, key: K) -> bool {
        self.observed.get(&key).copied().unwrap_or(false)
    }

    /// Accumulates `elapsed` and runs one pass once a period has passed
    pub fn update(&mut self, elapsed: Duration, gain: f32) -> Result<Vec<StatusChange<K>>, FieldError> {
        self.elapsed += elapsed;
        if self.elapsed < self.period {
            return Ok(Vec::new());
        }
        if self.period.is_zero() {
            self.elapsed = Duration::ZERO;
        } else {
            // keep the phase; one pass stands in for every period missed
            while self.elapsed >= self.period {
                self.elapsed -= self.period;
            }
        }
        self.reconcile(gain)
    }

    /// Runs one pass over every key of the replicated map
    pub fn reconcile(&mut self, gain: f32) -> Result<Vec<StatusChange<K>>, FieldError> {
        let mut changes = Vec::new();
        for (key, desired) in self.desired.entries() {
            let Some(effect) = self.effects.get_mut(&key) else {
                warn!("no effect registered for key {:?} of '{}'", key, self.desired.name());
                continue;
            };
            effect.set_gain(gain);

            let was_active = self.observed.get(&key).copied().unwrap_or(false);
            let active = sync_effect(effect, was_active, desired);
            self.observed.insert(key, active);

            if active != desired && self.desired.has_authority() {
                debug!("correcting key {:?} of '{}' to {}", key, self.desired.name(), active);
                self.desired.set(key, active)?;
            }
            if active != was_active {
                changes.push(StatusChange { key, active });
            }
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use replicast_shared::{ManualClock, ObjectId, ParticipantId, ReplicatedObject};

    use super::{sync_effect, LocalEffect, Reconciler, StatusChange, Tempo};

    /// Plays for a fixed number of checks, then stops by itself
    #[derive(Default)]
    struct FakeEffect {
        looping: bool,
        remaining: u32,
        length: u32,
        starts: u32,
    }

    impl FakeEffect {
        fn one_shot(length: u32) -> Self {
            Self {
                length,
                ..Self::default()
            }
        }

        fn tick(&mut self) {
            self.remaining = self.remaining.saturating_sub(1);
        }
    }

    impl LocalEffect for FakeEffect {
        fn is_playing(&self) -> bool {
            self.remaining > 0
        }

        fn is_looping(&self) -> bool {
            self.looping
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
    fn tempo_period() {
        assert_eq!(Tempo::default().period(), Duration::from_millis(40));
        assert_eq!(Tempo::new(0, 5).period(), Duration::ZERO);
    }

    #[test]
    fn finished_one_shot_is_not_restarted() {
        let mut effect = FakeEffect::one_shot(1);

        assert!(sync_effect(&mut effect, false, true));
        effect.tick();
        assert!(!sync_effect(&mut effect, true, true));
        assert_eq!(effect.starts, 1);
    }

    #[test]
    fn looping_effect_restarts_and_stops() {
        let mut effect = FakeEffect {
            looping: true,
            length: 1,
            ..FakeEffect::default()
        };

        assert!(sync_effect(&mut effect, true, true));
        assert!(effect.is_playing());
        assert!(!sync_effect(&mut effect, true, false));
        assert!(!effect.is_playing());
    }

    #[test]
    fn authority_corrects_finished_one_shot() {
        let mut builder = ReplicatedObject::builder(ObjectId::new(1), Arc::new(ManualClock::new()));
        let pads = builder.map::<u8, bool>("pads", 4);
        let object = builder.build().expect("build");
        object
            .authority_mutator()
            .set_local(ParticipantId::new(1))
            .expect("local");
        object
            .record_authority(Some(ParticipantId::new(1)), 1)
            .expect("authority");
        pads.set(2, true).expect("set");

        let mut reconciler = Reconciler::new(pads.clone(), Tempo::default());
        reconciler.register_effect(2, FakeEffect::one_shot(2));

        assert_eq!(
            reconciler.reconcile(1.0).expect("pass"),
            vec![StatusChange { key: 2, active: true }]
        );
        for _ in 0..2 {
            reconciler.effect_mut(2).expect("effect").tick();
        }
        assert_eq!(
            reconciler.reconcile(1.0).expect("pass"),
            vec![StatusChange {
                key: 2,
                active: false
            }]
        );
        assert_eq!(pads.get(2), Some(false));
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let mut builder = ReplicatedObject::builder(ObjectId::new(1), Arc::new(ManualClock::new()));
        let pads = builder.map::<u8, bool>("pads", 4);
        let object = builder.build().expect("build");
        object
            .authority_mutator()
            .set_local(ParticipantId::new(1))
            .expect("local");
        object
            .record_authority(Some(ParticipantId::new(1)), 1)
            .expect("authority");
        pads.set(7, true).expect("set");

        let mut reconciler: Reconciler<u8, FakeEffect> = Reconciler::new(pads, Tempo::default());

        assert!(reconciler.reconcile(1.0).expect("pass").is_empty());
        assert!(!reconciler.is_active(7));
    }

    #[test]
    fn update_waits_for_the_period() {
        let mut builder = ReplicatedObject::builder(ObjectId::new(1), Arc::new(ManualClock::new()));
        let pads = builder.map::<u8, bool>("pads", 4);
        let _object = builder.build().expect("build");
        let mut reconciler: Reconciler<u8, FakeEffect> = Reconciler::new(pads, Tempo::new(100, 1));

        assert!(reconciler.update(Duration::from_millis(5), 1.0).expect("update").is_empty());
        assert_eq!(reconciler.period(), Duration::from_millis(10));
    }

    #[test]
    fn update_carries_time_past_the_period() {
        let mut builder = ReplicatedObject::builder(ObjectId::new(1), Arc::new(ManualClock::new()));
        let pads = builder.map::<u8, bool>("pads", 4);
        let object = builder.build().expect("build");
        object
            .authority_mutator()
            .set_local(ParticipantId::new(1))
            .expect("local");
        object
            .record_authority(Some(ParticipantId::new(1)), 1)
            .expect("authority");
        pads.set(2, true).expect("set");

        let mut reconciler = Reconciler::new(pads, Tempo::new(100, 1));
        reconciler.register_effect(2, FakeEffect::one_shot(1));

        assert_eq!(
            reconciler.update(Duration::from_millis(15), 1.0).expect("update"),
            vec![StatusChange { key: 2, active: true }]
        );
        reconciler.effect_mut(2).expect("effect").tick();

        // 5ms carried over plus 5ms completes the next period
        assert_eq!(
            reconciler.update(Duration::from_millis(5), 1.0).expect("update"),
            vec![StatusChange {
                key: 2,
                active: false
            }]
        );
        assert!(reconciler.update(Duration::from_millis(5), 1.0).expect("update").is_empty());
    }
}
