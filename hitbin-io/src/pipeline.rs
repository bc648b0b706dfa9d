//! Single-pass binning run over one or more event files.
//!
//! Per event: statistics sampling on the raw hits, then the data cut, the
//! time cut, projection, metadata extraction and one row per projection
//! container. The source and geometry are opened before any container is
//! created.

use std::fmt;
use std::path::{Path, PathBuf};

use hitbin_algorithms::{
    BinningStats, CutDecision, DataCutPolicy, HistogramProjector, McInfoMaker, SkipReason,
    TimeCutPolicy,
};
use hitbin_core::{
    DetectorGeometry, Event, GeometryBinPlanner, HitSet, Projection, RunConfig, SpatialEdges,
};
use log::{debug, info, warn};

use crate::hdf5::{Hdf5ImageSink, ImageWriteOptions};
use crate::source::{EventSource, Hdf5EventSource};
use crate::tools::write_stats_json;
use crate::Result;

/// Counters of one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events_read: usize,
    pub events_written: usize,
    pub skipped_below_energy: usize,
    pub skipped_above_energy: usize,
    pub skipped_thrown_away: usize,
    /// Events with hits but no time window; written as empty images.
    pub empty_windows: usize,
    /// Hits outside the outer edges, summed over events (maximum over projections).
    pub hits_clipped: usize,
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    #[must_use]
    pub fn events_skipped(&self) -> usize {
        self.skipped_below_energy + self.skipped_above_energy + self.skipped_thrown_away
    }

    fn count_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::BelowEnergy => self.skipped_below_energy += 1,
            SkipReason::AboveEnergy => self.skipped_above_energy += 1,
            SkipReason::ThrownAway => self.skipped_thrown_away += 1,
        }
    }

    /// Adds the counters of `other`.
    pub fn absorb(&mut self, other: RunSummary) {
        self.events_read += other.events_read;
        self.events_written += other.events_written;
        self.skipped_below_energy += other.skipped_below_energy;
        self.skipped_above_energy += other.skipped_above_energy;
        self.skipped_thrown_away += other.skipped_thrown_away;
        self.empty_windows += other.empty_windows;
        self.hits_clipped += other.hits_clipped;
        self.outputs.extend(other.outputs);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events read, {} written, {} skipped ({} below energy, {} above energy, {} thrown away), {} empty windows, {} hits clipped",
            self.events_read,
            self.events_written,
            self.events_skipped(),
            self.skipped_below_energy,
            self.skipped_above_energy,
            self.skipped_thrown_away,
            self.empty_windows,
            self.hits_clipped
        )
    }
}

/// Result of binning one input.
#[derive(Debug)]
pub struct FileOutcome {
    pub summary: RunSummary,
    pub stats: Option<BinningStats>,
}

/// Result of binning several inputs.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub summary: RunSummary,
    /// Statistics merged over all inputs.
    pub stats: Option<BinningStats>,
}

/// Bins event files according to a validated [`RunConfig`].
pub struct FileBinner {
    config: RunConfig,
    edges: SpatialEdges,
    projector: HistogramProjector,
    time_cut: TimeCutPolicy,
    options: ImageWriteOptions,
}

impl FileBinner {
    /// Validates `config` and plans the bin edges for `geometry`.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid configuration.
    pub fn new(config: RunConfig, geometry: &DetectorGeometry) -> Result<Self> {
        config.validate()?;
        let edges = GeometryBinPlanner::new(config.det_geo, config.spatial_bins())?.plan(geometry)?;
        let projector = HistogramProjector::new(
            edges.clone(),
            config.time_bins(),
            config.n_channels,
            config.projections.projections(),
        )?;
        let time_cut = TimeCutPolicy::from_config(&config.time_cut);
        let options = ImageWriteOptions::from_config(&config)?;
        Ok(Self {
            config,
            edges,
            projector,
            time_cut,
            options,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[must_use]
    pub fn edges(&self) -> &SpatialEdges {
        &self.edges
    }

    #[must_use]
    pub fn projections(&self) -> &[Projection] {
        self.projector.projections()
    }

    /// Container path `<out_dir>/<stem>_<projection>.h5`.
    #[must_use]
    pub fn output_path(out_dir: &Path, stem: &str, projection: &Projection) -> PathBuf {
        out_dir.join(format!("{stem}_{}.h5", projection.name()))
    }

    /// Fresh statistics accumulator, if statistics are enabled.
    ///
    /// # Errors
    /// Returns a configuration error if the time edges cannot be built.
    pub fn new_stats(&self) -> Result<Option<BinningStats>> {
        match self.config.stats.sample_every {
            Some(every) => {
                let time_edges = self.time_cut.relative_edges(self.config.time_bins())?;
                Ok(Some(BinningStats::new(&self.edges, &time_edges, every)?))
            }
            None => Ok(None),
        }
    }

    /// Bins one HDF5 event file into `out_dir`.
    ///
    /// # Errors
    /// Returns an input error if the file cannot be opened, or any error
    /// raised while binning.
    pub fn run_file(&self, input: &Path, out_dir: &Path) -> Result<FileOutcome> {
        let mut source = Hdf5EventSource::open(input)?;
        self.run_opened(&mut source, out_dir)
    }

    fn run_opened(&self, source: &mut Hdf5EventSource, out_dir: &Path) -> Result<FileOutcome> {
        let stem = source
            .path()
            .file_stem()
            .map_or_else(|| "events".to_string(), |s| s.to_string_lossy().into_owned());
        let mut maker = McInfoMaker::builtin(&self.config.extractor, self.config.prod_ident)?;
        self.run_source(source, &stem, out_dir, &mut maker)
    }

    /// Bins several files, merging their statistics and exporting them as
    /// JSON when configured.
    ///
    /// Every input is opened before the first container is created.
    ///
    /// # Errors
    /// Returns an input error if any file cannot be opened; otherwise stops
    /// at the first failing input.
    pub fn run_files(&self, inputs: &[PathBuf], out_dir: &Path) -> Result<BatchOutcome> {
        let mut sources = inputs
            .iter()
            .map(Hdf5EventSource::open)
            .collect::<Result<Vec<_>>>()?;
        let mut batch = BatchOutcome::default();
        for source in &mut sources {
            let outcome = self.run_opened(source, out_dir)?;
            batch.summary.absorb(outcome.summary);
            match (&mut batch.stats, outcome.stats) {
                (Some(merged), Some(stats)) => merged.merge(&stats)?,
                (merged @ None, stats) => *merged = stats,
                (Some(_), None) => {}
            }
        }
        if let (Some(path), Some(stats)) = (&self.config.stats.export_json, &batch.stats) {
            write_stats_json(path, stats)?;
            info!("exported bin statistics to {}", path.display());
        }
        Ok(batch)
    }

    /// Centers hit times on the first triggered hit when configured, then
    /// applies the hit filters of `data_cut`.
    fn prepare_hits(&self, event: &mut Event, data_cut: &DataCutPolicy) -> HitSet {
        if self.config.center_time {
            if let Some(t0) = event.hits.first_triggered_time() {
                event.hits.shift_time(t0);
            }
        }
        if data_cut.filters_hits() {
            data_cut.filter_hits(&event.hits)
        } else {
            event.hits.clone()
        }
    }

    /// Bins all events of `source` into containers named after `stem`.
    ///
    /// # Errors
    /// Returns an error on a metadata schema mismatch or a write failure.
    /// Containers keep every row flushed before the failure.
    pub fn run_source<S: EventSource>(
        &self,
        source: &mut S,
        stem: &str,
        out_dir: &Path,
        maker: &mut McInfoMaker,
    ) -> Result<FileOutcome> {
        std::fs::create_dir_all(out_dir)?;
        let mut data_cut = DataCutPolicy::new(self.config.data_cut, self.config.seed);
        let mut stats = self.new_stats()?;

        let mut summary = RunSummary::default();
        let mut sinks = Vec::with_capacity(self.projections().len());
        for projection in self.projections() {
            let path = Self::output_path(out_dir, stem, projection);
            let shape = self.projector.shape(projection);
            sinks.push(Hdf5ImageSink::create(&path, projection, &shape, self.options)?);
            summary.outputs.push(path);
        }
        info!(
            "binning {stem}: {} events expected, projections {:?}",
            source
                .len_hint()
                .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
            self.projections().iter().map(Projection::name).collect::<Vec<_>>()
        );

        while self
            .config
            .max_events
            .map_or(true, |max| summary.events_read < max)
        {
            let Some(mut event) = source.next_event()? else {
                break;
            };
            summary.events_read += 1;

            if let Some(stats) = &mut stats {
                stats.observe(&event);
            }
            if let CutDecision::Skip(reason) = data_cut.evaluate(&event) {
                summary.count_skip(reason);
                continue;
            }

            let hits = self.prepare_hits(&mut event, &data_cut);

            let (window, selected) = self.time_cut.apply(&hits);
            if window.is_none() && !hits.is_empty() {
                summary.empty_windows += 1;
                warn!(
                    "event {}: no time window for {} hits, writing empty images",
                    event.info.event_id,
                    hits.len()
                );
            }
            let images = self.projector.project(&selected, window.as_ref())?;
            let record = maker.make(&event)?;

            let mut clipped = 0;
            for (sink, image) in sinks.iter_mut().zip(&images) {
                sink.push(&image.counts, &record)?;
                clipped = clipped.max(image.clipped);
            }
            if clipped > 0 {
                debug!("event {}: {clipped} hits clipped", event.info.event_id);
            }
            summary.hits_clipped += clipped;
            summary.events_written += 1;

            if summary.events_read % self.config.status_every == 0 {
                info!(
                    "{stem}: {} events read, {} written",
                    summary.events_read, summary.events_written
                );
            }
        }

        for sink in sinks {
            if let Some(stats) = &stats {
                sink.write_bin_stats(stats)?;
            }
            sink.finish()?;
        }
        info!("{stem}: {summary}");
        Ok(FileOutcome { summary, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdf5::ContainerReader;
    use crate::source::MemorySource;
    use hitbin_core::{DataCutConfig, EventInfo, Hit, McTrack, ProjectionSet, StatsConfig};
    use tempfile::tempdir;

    fn geometry() -> DetectorGeometry {
        let mut positions = Vec::new();
        for x in 0..3 {
            for y in 0..3 {
                for z in 0..4 {
                    positions.push([
                        10.0 * f64::from(x),
                        10.0 * f64::from(y),
                        40.0 + 10.0 * f64::from(z),
                    ]);
                }
            }
        }
        DetectorGeometry::new(positions).unwrap()
    }

    fn event(id: i64, energy: f64) -> Event {
        let hits: HitSet = [
            Hit::new(5.0, 5.0, 50.0, 100.0).triggered(),
            Hit::new(5.0, 5.0, 50.0, 120.0).triggered(),
            Hit::new(15.0, 5.0, 60.0, 200.0),
        ]
        .into_iter()
        .collect();
        Event::new(
            EventInfo {
                event_id: id,
                run_id: 1,
                trigger_mask: 0,
            },
            hits,
        )
        .with_track(McTrack {
            particle_type: 14,
            energy,
            ..McTrack::default()
        })
    }

    fn config() -> RunConfig {
        RunConfig::default()
            .with_n_bins([3, 3, 4, 10])
            .with_projections(ProjectionSet::ThreeD)
            .with_flush_rows(2)
    }

    #[test]
    fn test_run_source_writes_aligned_rows() {
        let dir = tempdir().unwrap();
        let config = config().with_data_cut(DataCutConfig {
            energy_lower: Some(5.0),
            ..DataCutConfig::default()
        });
        let binner = FileBinner::new(config, &geometry()).unwrap();
        let events = vec![event(0, 4.9), event(1, 5.1), event(2, 9.0), event(3, 1.0)];
        let mut maker = McInfoMaker::builtin("neutrino", None).unwrap();
        let outcome = binner
            .run_source(&mut MemorySource::new(events), "run", dir.path(), &mut maker)
            .unwrap();

        let summary = &outcome.summary;
        assert_eq!(summary.events_read, 4);
        assert_eq!(summary.events_written, 2);
        assert_eq!(summary.skipped_below_energy, 2);
        assert_eq!(summary.outputs.len(), 5);
        assert!(outcome.stats.is_none());

        let xyz = dir.path().join("run_xyz.h5");
        let reader = ContainerReader::open(&xyz).unwrap();
        assert_eq!(reader.rows(), 2);
        assert_eq!(reader.info().image_shape, vec![3, 3, 4]);
        let metadata = reader.read_metadata(0..2).unwrap();
        let id_col = reader.info().fields.iter().position(|f| f == "event_id").unwrap();
        assert_eq!(metadata[[0, id_col]], 1.0);
        assert_eq!(metadata[[1, id_col]], 2.0);
        let images = reader.read_images(0..2).unwrap();
        assert_eq!(images.iter().map(|&c| u64::from(c)).sum::<u64>(), 6);
    }

    #[test]
    fn test_max_events_and_stats() {
        let dir = tempdir().unwrap();
        let config = config()
            .with_max_events(3)
            .with_stats(StatsConfig {
                sample_every: Some(2),
                export_json: None,
            });
        let binner = FileBinner::new(config, &geometry()).unwrap();
        let events = (0..5).map(|i| event(i, 10.0)).collect();
        let mut maker = McInfoMaker::builtin("neutrino", Some(7)).unwrap();
        let outcome = binner
            .run_source(&mut MemorySource::new(events), "lim", dir.path(), &mut maker)
            .unwrap();

        assert_eq!(outcome.summary.events_read, 3);
        assert_eq!(outcome.summary.events_written, 3);
        let stats = outcome.stats.unwrap();
        assert_eq!(stats.seen(), 3);
        assert_eq!(stats.sampled(), 2);

        let reader = ContainerReader::open(dir.path().join("lim_rzt.h5")).unwrap();
        assert_eq!(reader.rows(), 3);
        assert!(reader.info().has_bin_stats);
        assert_eq!(reader.read_bin_stats().unwrap().unwrap(), stats);
    }

    #[test]
    fn test_missing_track_aborts_with_config_error() {
        let dir = tempdir().unwrap();
        let binner = FileBinner::new(config(), &geometry()).unwrap();
        let events = vec![Event::new(EventInfo::default(), event(0, 1.0).hits)];
        let mut maker = McInfoMaker::builtin("neutrino", None).unwrap();
        let err = binner
            .run_source(&mut MemorySource::new(events), "bad", dir.path(), &mut maker)
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_center_time_moves_first_trigger_to_zero() {
        let binner = FileBinner::new(config().with_center_time(true), &geometry()).unwrap();
        let data_cut = DataCutPolicy::new(DataCutConfig::default(), 1);
        let mut ev = Event::new(
            EventInfo::default(),
            [
                Hit::new(5.0, 5.0, 50.0, 1000.0).triggered(),
                Hit::new(5.0, 5.0, 50.0, 1010.0),
                Hit::new(5.0, 5.0, 50.0, 990.0),
                Hit::new(5.0, 5.0, 50.0, 1100.0).triggered(),
            ]
            .into_iter()
            .collect(),
        );
        let hits = binner.prepare_hits(&mut ev, &data_cut);
        assert_eq!(hits.time, vec![0.0, 10.0, -10.0, 100.0]);
        assert_eq!(ev.hits.time, hits.time);

        let plain = FileBinner::new(config(), &geometry()).unwrap();
        let mut ev = event(0, 1.0);
        let hits = plain.prepare_hits(&mut ev, &data_cut);
        assert_eq!(hits.time, vec![100.0, 120.0, 200.0]);
    }

    #[test]
    fn test_center_time_without_trigger_keeps_times() {
        let binner = FileBinner::new(config().with_center_time(true), &geometry()).unwrap();
        let data_cut = DataCutPolicy::new(DataCutConfig::default(), 1);
        let mut ev = Event::new(
            EventInfo::default(),
            [Hit::new(5.0, 5.0, 50.0, 400.0)].into_iter().collect(),
        );
        assert_eq!(binner.prepare_hits(&mut ev, &data_cut).time, vec![400.0]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RunConfig::default().with_chunk_rows(0);
        let err = FileBinner::new(config, &geometry()).err().unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_output_path() {
        let projection = Projection::from_name("xyzt").unwrap();
        assert_eq!(
            FileBinner::output_path(Path::new("out"), "file_1", &projection),
            PathBuf::from("out/file_1_xyzt.h5")
        );
    }
}
