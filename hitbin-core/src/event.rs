//! Events: hits plus per-event header and optional MC truth.

use serde::{Deserialize, Serialize};

use crate::hit::HitSet;

/// Event header as written by the data acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub event_id: i64,
    pub run_id: i64,
    pub trigger_mask: u64,
}

/// Primary MC particle of a simulated event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct McTrack {
    /// PDG id of the primary.
    pub particle_type: i64,
    /// Energy in GeV.
    pub energy: f64,
    /// 1 for charged current, 0 for neutral current.
    pub is_cc: f64,
    pub bjorkeny: f64,
    pub dir_x: f64,
    pub dir_y: f64,
    pub dir_z: f64,
    /// Interaction time (ns).
    pub time: f64,
}

/// One detector event as read from an event source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub info: EventInfo,
    pub hits: HitSet,
    pub track: Option<McTrack>,
}

impl Event {
    #[must_use]
    pub fn new(info: EventInfo, hits: HitSet) -> Self {
        Self {
            info,
            hits,
            track: None,
        }
    }

    /// Attaches MC truth.
    #[must_use]
    pub fn with_track(mut self, track: McTrack) -> Self {
        self.track = Some(track);
        self
    }

    /// Energy of the MC primary, if any.
    #[must_use]
    pub fn energy(&self) -> Option<f64> {
        self.track.map(|t| t.energy)
    }
}
