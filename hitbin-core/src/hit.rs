//! Per-event hit storage.
//!
//! Hits are kept in a Structure of Arrays (`SoA`) layout: one column per
//! field. The binning code only ever walks a few columns at a time, so
//! columnar storage keeps those loops tight.

use serde::{Deserialize, Serialize};

use crate::projection::Axis;

/// A single detector hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Calibrated x position (m).
    pub x: f64,
    /// Calibrated y position (m).
    pub y: f64,
    /// Calibrated z position (m).
    pub z: f64,
    /// Arrival time (ns).
    pub time: f64,
    /// PMT channel within the module.
    pub channel_id: u8,
    /// Whether the hit is part of a trigger.
    pub triggered: bool,
    /// Whether the hit is MC truth (as opposed to simulated background).
    pub is_mc: bool,
}

impl Hit {
    /// Creates an untriggered, non-MC hit.
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64, time: f64) -> Self {
        Self {
            x,
            y,
            z,
            time,
            channel_id: 0,
            triggered: false,
            is_mc: false,
        }
    }

    /// Sets the channel id.
    #[must_use]
    pub fn with_channel(mut self, channel_id: u8) -> Self {
        self.channel_id = channel_id;
        self
    }

    /// Marks the hit as triggered.
    #[must_use]
    pub fn triggered(mut self) -> Self {
        self.triggered = true;
        self
    }

    /// Marks the hit as MC truth.
    #[must_use]
    pub fn mc(mut self) -> Self {
        self.is_mc = true;
        self
    }
}

/// The hits of one event, stored column-wise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitSet {
    /// Columnar storage for x positions.
    pub x: Vec<f64>,
    /// Columnar storage for y positions.
    pub y: Vec<f64>,
    /// Columnar storage for z positions.
    pub z: Vec<f64>,
    /// Columnar storage for arrival times.
    pub time: Vec<f64>,
    /// Columnar storage for channel ids.
    pub channel_id: Vec<u8>,
    /// Columnar storage for trigger flags.
    pub triggered: Vec<bool>,
    /// Columnar storage for MC-truth flags.
    pub is_mc: Vec<bool>,
}

impl HitSet {
    /// Creates a new empty set with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            time: Vec::with_capacity(capacity),
            channel_id: Vec::with_capacity(capacity),
            triggered: Vec::with_capacity(capacity),
            is_mc: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Returns true if there are no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Clears all columns.
    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.time.clear();
        self.channel_id.clear();
        self.triggered.clear();
        self.is_mc.clear();
    }

    /// Pushes a single hit.
    pub fn push(&mut self, hit: Hit) {
        self.x.push(hit.x);
        self.y.push(hit.y);
        self.z.push(hit.z);
        self.time.push(hit.time);
        self.channel_id.push(hit.channel_id);
        self.triggered.push(hit.triggered);
        self.is_mc.push(hit.is_mc);
    }

    /// Returns hit `index` as a row, if it exists.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Hit> {
        (index < self.len()).then(|| Hit {
            x: self.x[index],
            y: self.y[index],
            z: self.z[index],
            time: self.time[index],
            channel_id: self.channel_id[index],
            triggered: self.triggered[index],
            is_mc: self.is_mc[index],
        })
    }

    /// Iterates over the hits as rows.
    pub fn iter(&self) -> impl Iterator<Item = Hit> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    /// Returns the raw column for a stored coordinate axis.
    ///
    /// Derived axes (radius) and the channel axis have no `f64` column.
    #[must_use]
    pub fn column(&self, axis: Axis) -> Option<&[f64]> {
        match axis {
            Axis::X => Some(&self.x),
            Axis::Y => Some(&self.y),
            Axis::Z => Some(&self.z),
            Axis::Time => Some(&self.time),
            Axis::Radius | Axis::Channel => None,
        }
    }

    /// Returns a new set holding only the hits for which `keep` is true.
    ///
    /// Hit order is preserved.
    #[must_use]
    pub fn filtered<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&Hit) -> bool,
    {
        let mut out = Self::with_capacity(self.len());
        for hit in self.iter() {
            if keep(&hit) {
                out.push(hit);
            }
        }
        out
    }

    /// Arrival times of the triggered hits.
    pub fn triggered_times(&self) -> impl Iterator<Item = f64> + '_ {
        self.time
            .iter()
            .zip(&self.triggered)
            .filter_map(|(&t, &trig)| trig.then_some(t))
    }

    /// Earliest arrival time among triggered hits.
    #[must_use]
    pub fn first_triggered_time(&self) -> Option<f64> {
        self.triggered_times().reduce(f64::min)
    }

    /// Smallest and largest arrival time.
    #[must_use]
    pub fn time_span(&self) -> Option<(f64, f64)> {
        let mut iter = self.time.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }

    /// Subtracts `offset` from every arrival time.
    pub fn shift_time(&mut self, offset: f64) {
        for t in &mut self.time {
            *t -= offset;
        }
    }
}

impl FromIterator<Hit> for HitSet {
    fn from_iter<I: IntoIterator<Item = Hit>>(iter: I) -> Self {
        let mut set = Self::default();
        for hit in iter {
            set.push(hit);
        }
        set
    }
}
