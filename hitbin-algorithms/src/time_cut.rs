//! Time-window selection on raw hit times.

use hitbin_core::config::{TimeCutConfig, TimeCutMode, TriggerPreset};
use hitbin_core::{BinEdges, HitSet, Result};

/// Fraction of the event time span kept by [`TimeCutPolicy::TimesliceRelative`].
const TIMESLICE_FRACTION: f64 = 0.3;

/// A closed time interval `[start, end]` in ns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    #[must_use]
    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    /// Hits whose time lies inside the window, in their original order.
    #[must_use]
    pub fn select(&self, hits: &HitSet) -> HitSet {
        hits.filtered(|hit| self.contains(hit.time))
    }

    /// Time-axis edges `linspace(start, end, n_bins + 1)`.
    ///
    /// A zero-width window (single distinct hit time) is widened by 0.5 ns
    /// on each side so the edges stay strictly increasing.
    ///
    /// # Errors
    /// Returns an error if `n_bins` is zero.
    pub fn edges(&self, n_bins: usize) -> Result<BinEdges> {
        if self.span() > 0.0 {
            BinEdges::linspace(self.start, self.end, n_bins)
        } else {
            BinEdges::linspace(self.start - 0.5, self.end + 0.5, n_bins)
        }
    }
}

/// Strategy choosing which hits of an event are histogrammed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeCutPolicy {
    /// Pass every hit through.
    NoCut,
    /// Central 30% of the event time span.
    TimesliceRelative,
    /// `[mean - before, mean + after]` around the mean triggered-hit time.
    TriggerCluster { before: f64, after: f64 },
}

impl TimeCutPolicy {
    #[must_use]
    pub fn from_config(config: &TimeCutConfig) -> Self {
        match config.mode {
            TimeCutMode::None => Self::NoCut,
            TimeCutMode::TimesliceRelative => Self::TimesliceRelative,
            TimeCutMode::TriggerCluster => Self::trigger_cluster(config.preset),
        }
    }

    #[must_use]
    pub fn trigger_cluster(preset: TriggerPreset) -> Self {
        let (before, after) = preset.window_ns();
        Self::TriggerCluster { before, after }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NoCut => "none",
            Self::TimesliceRelative => "timeslice_relative",
            Self::TriggerCluster { .. } => "trigger_cluster",
        }
    }

    /// Computes the window for one event.
    ///
    /// Returns `None` for an event without hits, or, for the trigger-cluster
    /// strategy, without triggered hits.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn window(&self, hits: &HitSet) -> Option<TimeWindow> {
        match *self {
            Self::NoCut => hits.time_span().map(|(lo, hi)| TimeWindow::new(lo, hi)),
            Self::TimesliceRelative => hits.time_span().map(|(lo, hi)| {
                let mid = 0.5 * (lo + hi);
                let half = 0.5 * TIMESLICE_FRACTION * (hi - lo);
                TimeWindow::new(mid - half, mid + half)
            }),
            Self::TriggerCluster { before, after } => {
                let (sum, n) = hits
                    .triggered_times()
                    .fold((0.0, 0usize), |(sum, n), t| (sum + t, n + 1));
                (n > 0).then(|| {
                    let mean = sum / n as f64;
                    TimeWindow::new(mean - before, mean + after)
                })
            }
        }
    }

    /// Computes the window and the hits inside it.
    #[must_use]
    pub fn apply(&self, hits: &HitSet) -> (Option<TimeWindow>, HitSet) {
        match self.window(hits) {
            Some(window) if matches!(self, Self::NoCut) => (Some(window), hits.clone()),
            Some(window) => (Some(window), window.select(hits)),
            None => (None, HitSet::default()),
        }
    }

    /// Fixed time edges relative to the first triggered hit.
    ///
    /// Used where one set of time edges must describe every event, such as
    /// the diagnostic time histogram. Strategies without a fixed width use
    /// the widest trigger-cluster preset.
    ///
    /// # Errors
    /// Returns an error if `n_bins` is zero.
    pub fn relative_edges(&self, n_bins: usize) -> Result<BinEdges> {
        let (before, after) = match *self {
            Self::TriggerCluster { before, after } => (before, after),
            Self::NoCut | Self::TimesliceRelative => TriggerPreset::All.window_ns(),
        };
        BinEdges::linspace(-before, after, n_bins)
    }
}

impl Default for TimeCutPolicy {
    fn default() -> Self {
        Self::trigger_cluster(TriggerPreset::All)
    }
}
