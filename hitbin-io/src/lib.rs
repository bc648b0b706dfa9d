//! hitbin-io: HDF5 I/O and the binning pipeline.
//!
//! This crate provides:
//! - **Event sources** - sequential events from HDF5 or memory
//! - **Geometry loading** - module positions from JSON
//! - **Image containers** - chunked, compressed image/metadata storage
//! - **Pipeline** - the per-file binning run
//! - **Tools** - concatenation, shuffling and statistics export
//!

mod error;
pub mod geometry;
pub mod hdf5;
pub mod pipeline;
pub mod source;
pub mod tools;

pub use error::{Error, Result};
pub use geometry::{GeometrySource, JsonGeometry};
pub use hdf5::{read_bin_stats, ContainerInfo, ContainerReader, Hdf5ImageSink, ImageWriteOptions};
pub use pipeline::{BatchOutcome, FileBinner, FileOutcome, RunSummary};
pub use source::{write_events_hdf5, EventSource, Hdf5EventSource, MemorySource};
pub use tools::{
    concat, merge_container_stats, read_stats_json, shuffle, write_stats_json, StorageOverrides,
    DEFAULT_SHUFFLE_SEED,
};
