use replicast_shared::LinkConditionerConfig;

/// Decides how many copies of each outgoing message a link delivers
pub struct LinkConditioner {
    config: LinkConditionerConfig,
    rng: fastrand::Rng,
}

impl LinkConditioner {
    pub fn new(config: LinkConditionerConfig, participant_salt: u64) -> Self {
        Self {
            config,
            rng: fastrand::Rng::with_seed(config.seed.wrapping_add(participant_salt)),
        }
    }

    pub fn copies(&mut self) -> usize {
        if self.config.duplicate_chance > 0.0 && self.rng.f32() < self.config.duplicate_chance {
            2
        } else {
            1
        }
    }
}
