//! Run configuration.
//!
//! A [`RunConfig`] is loaded from JSON (every field optional, missing fields
//! take their defaults), adjusted with `with_*` builders or command-line
//! overrides, and checked once with [`RunConfig::validate`] before any
//! output is created.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::GeometryProfile;
use crate::projection::ProjectionSet;

/// Time-window strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeCutMode {
    /// Keep every hit.
    None,
    /// Keep the central 30% of the event's time span.
    TimesliceRelative,
    /// Keep a fixed window around the mean triggered-hit time.
    #[default]
    TriggerCluster,
}

impl FromStr for TimeCutMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "timeslice_relative" => Ok(Self::TimesliceRelative),
            "trigger_cluster" => Ok(Self::TriggerCluster),
            other => Err(Error::config(format!("unknown time cut mode '{other}'"))),
        }
    }
}

/// Window preset for [`TimeCutMode::TriggerCluster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerPreset {
    /// 350 ns before, 850 ns after.
    #[default]
    #[serde(rename = "all")]
    All,
    /// 250 ns before, 500 ns after.
    #[serde(rename = "tight-1")]
    Tight1,
    /// 150 ns before, 200 ns after.
    #[serde(rename = "tight-2")]
    Tight2,
}

impl TriggerPreset {
    /// `(before, after)` in ns relative to the mean triggered-hit time.
    #[must_use]
    pub const fn window_ns(self) -> (f64, f64) {
        match self {
            Self::All => (350.0, 850.0),
            Self::Tight1 => (250.0, 500.0),
            Self::Tight2 => (150.0, 200.0),
        }
    }
}

impl FromStr for TriggerPreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "tight-1" => Ok(Self::Tight1),
            "tight-2" => Ok(Self::Tight2),
            other => Err(Error::config(format!(
                "unknown trigger cluster preset '{other}'"
            ))),
        }
    }
}

/// Time-cut settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeCutConfig {
    pub mode: TimeCutMode,
    pub preset: TriggerPreset,
}

/// Per-event and per-hit data cuts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataCutConfig {
    /// Skip MC events below this energy (GeV).
    pub energy_lower: Option<f64>,
    /// Skip MC events above this energy (GeV).
    pub energy_upper: Option<f64>,
    /// Probability in `[0, 1)` of randomly skipping an event.
    pub throw_away_prob: f64,
    /// Keep only triggered hits.
    pub triggered_only: bool,
    /// Keep only MC-truth hits.
    pub mc_hits_only: bool,
}

/// Compression library of an output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complib {
    None,
    #[default]
    #[serde(alias = "zlib")]
    Gzip,
    Lzf,
}

impl Complib {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Lzf => "lzf",
        }
    }
}

impl fmt::Display for Complib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Complib {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "gzip" | "zlib" => Ok(Self::Gzip),
            "lzf" => Ok(Self::Lzf),
            other => Err(Error::config(format!(
                "unknown compression library '{other}' (expected gzip, zlib, lzf or none)"
            ))),
        }
    }
}

/// A resolved compression policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip(u8),
    Lzf,
}

impl Compression {
    /// Level used when gzip is requested without one.
    pub const DEFAULT_GZIP_LEVEL: u8 = 1;

    /// Combines a library with an optional level.
    ///
    /// # Errors
    /// Returns a configuration error for a gzip level above 9, or for a level
    /// given to a library that takes none.
    pub fn new(lib: Complib, level: Option<u8>) -> Result<Self> {
        match (lib, level) {
            (Complib::Gzip, None) => Ok(Self::Gzip(Self::DEFAULT_GZIP_LEVEL)),
            (Complib::Gzip, Some(level)) if level <= 9 => Ok(Self::Gzip(level)),
            (Complib::Gzip, Some(level)) => Err(Error::config(format!(
                "gzip level must be 0-9, got {level}"
            ))),
            (Complib::Lzf, None) => Ok(Self::Lzf),
            (Complib::None, None) => Ok(Self::None),
            (lib, Some(level)) => Err(Error::config(format!(
                "compression '{lib}' takes no level, got {level}"
            ))),
        }
    }

    #[must_use]
    pub const fn complib(self) -> Complib {
        match self {
            Self::None => Complib::None,
            Self::Gzip(_) => Complib::Gzip,
            Self::Lzf => Complib::Lzf,
        }
    }

    #[must_use]
    pub const fn level(self) -> Option<u8> {
        match self {
            Self::Gzip(level) => Some(level),
            Self::None | Self::Lzf => None,
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::Gzip(Self::DEFAULT_GZIP_LEVEL)
    }
}

/// Diagnostic bin-statistics pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Sample every Nth event; `None` disables the pass.
    pub sample_every: Option<usize>,
    /// Write the merged statistics as JSON to this path.
    pub export_json: Option<PathBuf>,
}

/// Complete configuration of a binning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Bins along `[x, y, z, t]`.
    pub n_bins: [usize; 4],
    pub det_geo: GeometryProfile,
    pub projections: ProjectionSet,
    pub time_cut: TimeCutConfig,
    pub data_cut: DataCutConfig,
    /// Injected into every metadata row as `prod_ident`.
    pub prod_ident: Option<i64>,
    pub seed: u64,
    /// Rows per HDF5 chunk.
    pub chunk_rows: usize,
    pub complib: Complib,
    pub complevel: Option<u8>,
    /// Rows buffered before a flush.
    pub flush_rows: usize,
    pub stats: StatsConfig,
    pub max_events: Option<usize>,
    /// Metadata extractor name.
    pub extractor: String,
    /// Shift hit times so the first triggered hit is at zero.
    pub center_time: bool,
    /// Channels per module for the channel-id axis.
    pub n_channels: usize,
    /// Progress log interval (events).
    pub status_every: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_bins: [11, 13, 18, 60],
            det_geo: GeometryProfile::default(),
            projections: ProjectionSet::default(),
            time_cut: TimeCutConfig::default(),
            data_cut: DataCutConfig::default(),
            prod_ident: None,
            seed: 42,
            chunk_rows: 32,
            complib: Complib::Gzip,
            complevel: None,
            flush_rows: 1000,
            stats: StatsConfig::default(),
            max_events: None,
            extractor: "neutrino".to_string(),
            center_time: false,
            n_channels: 31,
            status_every: 1000,
        }
    }
}

impl RunConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an input error if the file cannot be read, or a configuration
    /// error if it is not valid JSON for this schema.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::input(format!("cannot open config {}: {e}", path.display())))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::config(format!("invalid config {}: {e}", path.display())))
    }

    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    /// Returns a configuration error on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid config: {e}")))
    }

    #[must_use]
    pub fn with_n_bins(mut self, n_bins: [usize; 4]) -> Self {
        self.n_bins = n_bins;
        self
    }

    #[must_use]
    pub fn with_projections(mut self, projections: ProjectionSet) -> Self {
        self.projections = projections;
        self
    }

    #[must_use]
    pub fn with_time_cut(mut self, mode: TimeCutMode, preset: TriggerPreset) -> Self {
        self.time_cut = TimeCutConfig { mode, preset };
        self
    }

    #[must_use]
    pub fn with_data_cut(mut self, data_cut: DataCutConfig) -> Self {
        self.data_cut = data_cut;
        self
    }

    #[must_use]
    pub fn with_prod_ident(mut self, prod_ident: i64) -> Self {
        self.prod_ident = Some(prod_ident);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = rows;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, complib: Complib, complevel: Option<u8>) -> Self {
        self.complib = complib;
        self.complevel = complevel;
        self
    }

    #[must_use]
    pub fn with_flush_rows(mut self, rows: usize) -> Self {
        self.flush_rows = rows;
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: StatsConfig) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = Some(max_events);
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, name: impl Into<String>) -> Self {
        self.extractor = name.into();
        self
    }

    #[must_use]
    pub fn with_center_time(mut self, enabled: bool) -> Self {
        self.center_time = enabled;
        self
    }

    /// Spatial bin counts `[x, y, z]`.
    #[must_use]
    pub fn spatial_bins(&self) -> [usize; 3] {
        [self.n_bins[0], self.n_bins[1], self.n_bins[2]]
    }

    /// Time bin count.
    #[must_use]
    pub fn time_bins(&self) -> usize {
        self.n_bins[3]
    }

    /// The resolved compression policy.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid library/level pair.
    pub fn compression(&self) -> Result<Compression> {
        Compression::new(self.complib, self.complevel)
    }

    /// Rejects contradictory or out-of-range settings.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.n_bins.contains(&0) {
            return Err(Error::config(format!(
                "bin counts must be positive, got {:?}",
                self.n_bins
            )));
        }
        if self.chunk_rows == 0 {
            return Err(Error::config("chunk size must be positive"));
        }
        if self.flush_rows == 0 {
            return Err(Error::config("flush interval must be positive"));
        }
        if self.status_every == 0 {
            return Err(Error::config("status interval must be positive"));
        }
        if self.n_channels == 0 {
            return Err(Error::config("channel count must be positive"));
        }
        self.compression()?;

        let cut = &self.data_cut;
        if !(0.0..1.0).contains(&cut.throw_away_prob) {
            return Err(Error::config(format!(
                "throw-away probability must be in [0, 1), got {}",
                cut.throw_away_prob
            )));
        }
        if let (Some(lower), Some(upper)) = (cut.energy_lower, cut.energy_upper) {
            if lower > upper {
                return Err(Error::config(format!(
                    "energy lower bound {lower} is above upper bound {upper}"
                )));
            }
        }

        match self.stats.sample_every {
            Some(0) => return Err(Error::config("stats sampling interval must be positive")),
            None if self.stats.export_json.is_some() => {
                return Err(Error::config(
                    "bin stats export requested but the stats pass is disabled",
                ))
            }
            _ => {}
        }

        if self.extractor.is_empty() {
            return Err(Error::config("extractor name is empty"));
        }
        Ok(())
    }
}
