//! hitbin-core: Data model and bin planning for hit binning.
//!
//! This crate provides the hit and event types, bin edges, projection
//! definitions, detector-geometry bin planning and the run configuration
//! shared by the other hitbin crates.
//!

pub mod config;
pub mod edges;
pub mod error;
pub mod event;
pub mod geometry;
pub mod hit;
pub mod projection;

pub use config::{
    Complib, Compression, DataCutConfig, RunConfig, StatsConfig, TimeCutConfig, TimeCutMode,
    TriggerPreset,
};
pub use edges::BinEdges;
pub use error::{Error, Result};
pub use event::{Event, EventInfo, McTrack};
pub use geometry::{DetectorGeometry, GeometryBinPlanner, GeometryProfile, SpatialEdges};
pub use hit::{Hit, HitSet};
pub use projection::{Axis, FourthAxis, Projection, ProjectionSet};
