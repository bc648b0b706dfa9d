//! Per-event retain/skip decisions and per-hit filters.

use std::fmt;

use hitbin_core::config::DataCutConfig;
use hitbin_core::{Event, HitSet};
use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Why an event was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    BelowEnergy,
    AboveEnergy,
    ThrownAway,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BelowEnergy => "energy below lower bound",
            Self::AboveEnergy => "energy above upper bound",
            Self::ThrownAway => "random throw-away",
        })
    }
}

/// Outcome of [`DataCutPolicy::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutDecision {
    Retain,
    Skip(SkipReason),
}

impl CutDecision {
    #[must_use]
    pub fn is_retained(self) -> bool {
        matches!(self, Self::Retain)
    }
}

/// Data cuts with their own seeded generator.
///
/// The generator advances exactly once per evaluated event whenever the
/// throw-away probability is positive, regardless of the energy checks, so
/// the same seed and event sequence always give the same decisions.
#[derive(Debug, Clone)]
pub struct DataCutPolicy {
    config: DataCutConfig,
    rng: SmallRng,
}

impl DataCutPolicy {
    #[must_use]
    pub fn new(config: DataCutConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DataCutConfig {
        &self.config
    }

    /// Decides whether `event` is binned.
    ///
    /// Events without an MC track are never subject to the energy bounds.
    pub fn evaluate(&mut self, event: &Event) -> CutDecision {
        let thrown_away = self.config.throw_away_prob > 0.0
            && self.rng.gen::<f64>() < self.config.throw_away_prob;

        let decision = match event.energy() {
            Some(e) if self.config.energy_lower.is_some_and(|lo| e < lo) => {
                CutDecision::Skip(SkipReason::BelowEnergy)
            }
            Some(e) if self.config.energy_upper.is_some_and(|hi| e > hi) => {
                CutDecision::Skip(SkipReason::AboveEnergy)
            }
            _ if thrown_away => CutDecision::Skip(SkipReason::ThrownAway),
            _ => CutDecision::Retain,
        };
        if let CutDecision::Skip(reason) = decision {
            debug!("skipping event {}: {reason}", event.info.event_id);
        }
        decision
    }

    /// Whether [`Self::filter_hits`] removes anything.
    #[must_use]
    pub fn filters_hits(&self) -> bool {
        self.config.triggered_only || self.config.mc_hits_only
    }

    /// Applies the triggered-only and MC-only hit filters.
    #[must_use]
    pub fn filter_hits(&self, hits: &HitSet) -> HitSet {
        if !self.filters_hits() {
            return hits.clone();
        }
        let triggered_only = self.config.triggered_only;
        let mc_only = self.config.mc_hits_only;
        hits.filtered(|hit| (!triggered_only || hit.triggered) && (!mc_only || hit.is_mc))
    }
}
