//! Diagnostic 1D histograms of the raw hit coordinates.
//!
//! For every monitored field the accumulator keeps a fine histogram over
//! the image range plus counters of the hits below and above it, so the
//! placement of the image bin edges can be checked after a run.

use hitbin_core::{BinEdges, Error, Event, HitSet, Result, SpatialEdges};
use serde::{Deserialize, Serialize};

/// Bin multiplier for spatial diagnostic histograms.
pub const RES_INCREASE: usize = 5;

/// How a field value is taken from a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    /// The stored value.
    Raw,
    /// Time minus the time of the event's first triggered hit.
    TimeShifted,
}

/// Hit column a field reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsSource {
    PosX,
    PosY,
    PosZ,
    Time,
}

impl SampleMode {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::TimeShifted => "time_shifted",
        }
    }

    /// Parses [`Self::name`].
    ///
    /// # Errors
    /// Returns an input error for an unknown name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "raw" => Ok(Self::Raw),
            "time_shifted" => Ok(Self::TimeShifted),
            other => Err(Error::input(format!("unknown sample mode '{other}'"))),
        }
    }
}

impl StatsSource {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PosX => "pos_x",
            Self::PosY => "pos_y",
            Self::PosZ => "pos_z",
            Self::Time => "time",
        }
    }

    /// Parses [`Self::name`].
    ///
    /// # Errors
    /// Returns an input error for an unknown name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "pos_x" => Ok(Self::PosX),
            "pos_y" => Ok(Self::PosY),
            "pos_z" => Ok(Self::PosZ),
            "time" => Ok(Self::Time),
            other => Err(Error::input(format!("unknown stats source '{other}'"))),
        }
    }

    fn column(self, hits: &HitSet) -> &[f64] {
        match self {
            Self::PosX => &hits.x,
            Self::PosY => &hits.y,
            Self::PosZ => &hits.z,
            Self::Time => &hits.time,
        }
    }
}

/// Histogram and out-of-range counters of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub name: String,
    pub source: StatsSource,
    pub mode: SampleMode,
    /// Edges of the image binning.
    pub bin_edges: BinEdges,
    /// Edges of the diagnostic histogram.
    pub hist_bin_edges: BinEdges,
    pub hist: Vec<u64>,
    /// Hits below the first and above the last edge.
    pub cut_off: [u64; 2],
}

impl FieldStats {
    /// Creates an empty field.
    ///
    /// # Errors
    /// Returns an error if `res_increase` is zero.
    pub fn new(
        name: &str,
        source: StatsSource,
        mode: SampleMode,
        bin_edges: BinEdges,
        res_increase: usize,
    ) -> Result<Self> {
        let hist_bin_edges = bin_edges.refined(res_increase)?;
        Ok(Self {
            name: name.to_string(),
            source,
            mode,
            hist: vec![0; hist_bin_edges.n_bins()],
            bin_edges,
            hist_bin_edges,
            cut_off: [0; 2],
        })
    }

    /// Adds one value.
    pub fn fill(&mut self, value: f64) {
        if let Some(i) = self.hist_bin_edges.index(value) {
            self.hist[i] += 1;
        } else if value < self.hist_bin_edges.first() {
            self.cut_off[0] += 1;
        } else if value > self.hist_bin_edges.last() {
            self.cut_off[1] += 1;
        }
    }

    /// Total hits seen, inside or outside the range.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.hist.iter().sum::<u64>() + self.cut_off[0] + self.cut_off[1]
    }

    fn same_binning(&self, other: &Self) -> bool {
        self.name == other.name
            && self.source == other.source
            && self.mode == other.mode
            && self.bin_edges == other.bin_edges
            && self.hist_bin_edges == other.hist_bin_edges
    }
}

/// Mergeable diagnostic statistics of one or more runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredStats")]
pub struct BinningStats {
    fields: Vec<FieldStats>,
    sample_every: usize,
    seen: u64,
    sampled: u64,
}

/// Unchecked serialized form of [`BinningStats`].
#[derive(Deserialize)]
struct StoredStats {
    fields: Vec<FieldStats>,
    sample_every: usize,
    seen: u64,
    sampled: u64,
}

impl TryFrom<StoredStats> for BinningStats {
    type Error = Error;

    fn try_from(stored: StoredStats) -> Result<Self> {
        Self::restore(stored.fields, stored.sample_every, stored.seen, stored.sampled)
    }
}

impl BinningStats {
    /// Creates the standard fields `pos_x`, `pos_y`, `pos_z` and `time`.
    ///
    /// Spatial fields use [`RES_INCREASE`] times the image resolution; the
    /// time field uses exactly `time_edges` and samples time relative to
    /// the first triggered hit.
    ///
    /// # Errors
    /// Returns a configuration error if `sample_every` is zero.
    pub fn new(spatial: &SpatialEdges, time_edges: &BinEdges, sample_every: usize) -> Result<Self> {
        let fields = vec![
            FieldStats::new("pos_x", StatsSource::PosX, SampleMode::Raw, spatial.x.clone(), RES_INCREASE)?,
            FieldStats::new("pos_y", StatsSource::PosY, SampleMode::Raw, spatial.y.clone(), RES_INCREASE)?,
            FieldStats::new("pos_z", StatsSource::PosZ, SampleMode::Raw, spatial.z.clone(), RES_INCREASE)?,
            FieldStats::new("time", StatsSource::Time, SampleMode::TimeShifted, time_edges.clone(), 1)?,
        ];
        Self::with_fields(fields, sample_every)
    }

    /// Creates statistics over custom fields.
    ///
    /// # Errors
    /// Returns a configuration error if `sample_every` is zero or two fields
    /// share a name.
    pub fn with_fields(fields: Vec<FieldStats>, sample_every: usize) -> Result<Self> {
        if sample_every == 0 {
            return Err(Error::config("stats sampling interval must be positive"));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::config(format!("duplicate stats field '{}'", field.name)));
            }
            if field.hist.len() != field.hist_bin_edges.n_bins() {
                return Err(Error::config(format!(
                    "stats field '{}' has {} counts for {} bins",
                    field.name,
                    field.hist.len(),
                    field.hist_bin_edges.n_bins()
                )));
            }
        }
        Ok(Self {
            fields,
            sample_every,
            seen: 0,
            sampled: 0,
        })
    }

    /// Rebuilds statistics read back from storage.
    ///
    /// # Errors
    /// Same as [`Self::with_fields`].
    pub fn restore(fields: Vec<FieldStats>, sample_every: usize, seen: u64, sampled: u64) -> Result<Self> {
        let mut stats = Self::with_fields(fields, sample_every)?;
        stats.seen = seen;
        stats.sampled = sampled;
        Ok(stats)
    }

    #[must_use]
    pub fn sample_every(&self) -> usize {
        self.sample_every
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldStats] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldStats> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Events offered so far.
    #[must_use]
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Events actually sampled.
    #[must_use]
    pub fn sampled(&self) -> u64 {
        self.sampled
    }

    /// Offers one event; every `sample_every`-th event, starting with the
    /// first, is sampled.
    ///
    /// Time-shifted fields skip events without triggered hits.
    pub fn observe(&mut self, event: &Event) {
        let take = self.seen % self.sample_every.max(1) as u64 == 0;
        self.seen += 1;
        if !take {
            return;
        }
        self.sampled += 1;

        let hits = &event.hits;
        let t0 = hits.first_triggered_time();
        for field in &mut self.fields {
            let shift = match field.mode {
                SampleMode::Raw => 0.0,
                SampleMode::TimeShifted => match t0 {
                    Some(t0) => t0,
                    None => continue,
                },
            };
            for &value in field.source.column(hits) {
                field.fill(value - shift);
            }
        }
    }

    /// Adds `other` into `self`.
    ///
    /// # Errors
    /// Returns a configuration error if the field sets or binnings differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.fields.len() != other.fields.len() {
            return Err(Error::config(format!(
                "cannot merge bin stats with {} and {} fields",
                self.fields.len(),
                other.fields.len()
            )));
        }
        if let Some((a, _)) = self
            .fields
            .iter()
            .zip(&other.fields)
            .find(|(a, b)| !a.same_binning(b))
        {
            return Err(Error::config(format!(
                "cannot merge bin stats: field '{}' differs in name or binning",
                a.name
            )));
        }

        for (a, b) in self.fields.iter_mut().zip(&other.fields) {
            for (x, y) in a.hist.iter_mut().zip(&b.hist) {
                *x += y;
            }
            a.cut_off[0] += b.cut_off[0];
            a.cut_off[1] += b.cut_off[1];
        }
        self.seen += other.seen;
        self.sampled += other.sampled;
        Ok(())
    }

    /// Merges a sequence of statistics into one.
    ///
    /// Returns `Ok(None)` for an empty sequence.
    ///
    /// # Errors
    /// Returns a configuration error on the first incompatible entry.
    pub fn merge_all<I>(stats: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut iter = stats.into_iter();
        let Some(mut total) = iter.next() else {
            return Ok(None);
        };
        for next in iter {
            total.merge(&next)?;
        }
        Ok(Some(total))
    }
}
