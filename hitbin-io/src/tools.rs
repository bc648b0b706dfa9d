//! Container tools: concatenation, shuffling and bin-statistics export.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use hitbin_algorithms::BinningStats;
use hitbin_core::{Compression, Projection};
use log::info;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::hdf5::{ContainerReader, Hdf5ImageSink, ImageWriteOptions};
use crate::{Error, Result};

/// Default seed of [`shuffle`].
pub const DEFAULT_SHUFFLE_SEED: u64 = 42;

/// Storage overrides for derived containers.
///
/// Unset values are inherited from the (first) input container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageOverrides {
    pub chunk_rows: Option<usize>,
    pub compression: Option<Compression>,
    /// Rows copied per read and write.
    pub block_rows: usize,
}

impl Default for StorageOverrides {
    fn default() -> Self {
        Self {
            chunk_rows: None,
            compression: None,
            block_rows: 1000,
        }
    }
}

impl StorageOverrides {
    fn apply(&self, inherited: ImageWriteOptions) -> ImageWriteOptions {
        let mut options = inherited.with_flush_rows(self.block_rows.max(1));
        if let Some(rows) = self.chunk_rows {
            options = options.with_chunk_rows(rows);
        }
        if let Some(compression) = self.compression {
            options = options.with_compression(compression);
        }
        options
    }
}

fn projection_of(reader: &ContainerReader, path: &Path) -> Result<Projection> {
    let name = reader.info().projection.as_deref().ok_or_else(|| {
        Error::InvalidFormat(format!("{}: missing projection attribute", path.display()))
    })?;
    Ok(Projection::from_name(name)?)
}

/// Appends the rows of `inputs` into a new container at `output`.
///
/// All inputs must share image shape and metadata fields. Bin statistics
/// present in every input are merged into the output.
///
/// # Errors
/// Returns an error if the inputs are incompatible or I/O fails.
pub fn concat(inputs: &[PathBuf], output: &Path, overrides: &StorageOverrides) -> Result<usize> {
    let Some(first_path) = inputs.first() else {
        return Err(hitbin_core::Error::config("concat needs at least one input").into());
    };
    let first = ContainerReader::open(first_path)?;
    let projection = projection_of(&first, first_path)?;
    let options = overrides.apply(first.info().write_options(overrides.block_rows));
    let mut sink = Hdf5ImageSink::create(output, &projection, &first.info().image_shape, options)?;
    drop(first);

    let mut stats: Option<BinningStats> = None;
    let mut all_have_stats = true;
    for path in inputs {
        let reader = ContainerReader::open(path)?;
        let info = reader.info();
        if info.image_shape != sink.image_shape() {
            return Err(Error::InvalidFormat(format!(
                "{}: image shape {:?} differs from {:?}",
                path.display(),
                info.image_shape,
                sink.image_shape()
            )));
        }
        let block = overrides.block_rows.max(1);
        let mut start = 0;
        while start < reader.rows() {
            let end = (start + block).min(reader.rows());
            let images = reader.read_images(start..end)?;
            let metadata = reader.read_metadata(start..end)?;
            sink.push_rows(&images, &metadata, &info.fields)?;
            start = end;
        }

        match (reader.read_bin_stats()?, &mut stats) {
            (Some(other), Some(merged)) => merged.merge(&other)?,
            (Some(other), None) if all_have_stats => stats = Some(other),
            _ => all_have_stats = false,
        }
        info!("appended {} rows from {}", reader.rows(), path.display());
    }

    if let Some(stats) = stats.filter(|_| all_have_stats) {
        sink.write_bin_stats(&stats)?;
    }
    sink.finish()
}

/// Writes the rows of `input` to `output` in a seeded random order.
///
/// Images and metadata are permuted together.
///
/// # Errors
/// Returns an error if I/O fails.
pub fn shuffle(input: &Path, output: &Path, seed: u64, overrides: &StorageOverrides) -> Result<usize> {
    let reader = ContainerReader::open(input)?;
    let info = reader.info();
    let projection = projection_of(&reader, input)?;
    let options = overrides.apply(info.write_options(overrides.block_rows));
    let mut sink = Hdf5ImageSink::create(output, &projection, &info.image_shape, options)?;

    let mut order: Vec<usize> = (0..reader.rows()).collect();
    let mut rng = SmallRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    for &row in &order {
        let images = reader.read_images(row..row + 1)?;
        let metadata = reader.read_metadata(row..row + 1)?;
        sink.push_rows(&images, &metadata, &info.fields)?;
    }
    if let Some(stats) = reader.read_bin_stats()? {
        sink.write_bin_stats(&stats)?;
    }
    let rows = sink.finish()?;
    info!("shuffled {rows} rows of {} with seed {seed}", input.display());
    Ok(rows)
}

/// Merges the bin statistics stored in `containers`.
///
/// Containers without statistics are skipped; `None` if none had any.
///
/// # Errors
/// Returns an error if a container cannot be read or binnings differ.
pub fn merge_container_stats(containers: &[PathBuf]) -> Result<Option<BinningStats>> {
    let mut all = Vec::new();
    for path in containers {
        if let Some(stats) = ContainerReader::open(path)?.read_bin_stats()? {
            all.push(stats);
        }
    }
    Ok(BinningStats::merge_all(all)?)
}

/// Exports bin statistics as JSON for plotting.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_stats_json<P: AsRef<Path>>(path: P, stats: &BinningStats) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, stats)?;
    Ok(())
}

/// Reads bin statistics exported by [`write_stats_json`].
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn read_stats_json<P: AsRef<Path>>(path: P) -> Result<BinningStats> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
