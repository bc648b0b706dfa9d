//! hitbin-algorithms: Per-event processing for hit binning.
//!
//! This crate provides the processing stages applied to each event:
//! - **Data cuts** - seeded retain/skip decisions and hit filters
//! - **Time cuts** - time-window selection on raw hit times
//! - **Projection** - dense histogram images over fixed bin edges
//! - **Info extraction** - fixed-schema metadata records
//! - **Bin statistics** - mergeable diagnostic histograms
//!

pub mod data_cut;
pub mod info;
pub mod projector;
pub mod stats;
pub mod time_cut;

pub use data_cut::{CutDecision, DataCutPolicy, SkipReason};
pub use info::{BuiltinExtractor, InfoExtractor, InfoRecord, McInfoMaker, PROD_IDENT_FIELD};
pub use projector::{HistogramImage, HistogramProjector};
pub use stats::{BinningStats, FieldStats, SampleMode, StatsSource};
pub use time_cut::{TimeCutPolicy, TimeWindow};
