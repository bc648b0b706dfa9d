//! Event sources.
//!
//! The HDF5 event layout is columnar:
//!
//! - `events/{event_id, run_id, trigger_mask, n_hits}`: one row per event
//! - `hits/{pos_x, pos_y, pos_z, time, channel_id, triggered, is_mc}`: all
//!   hits of all events, concatenated in event order
//! - `mc_tracks/{particle_type, energy, is_cc, bjorkeny, dir_x, dir_y, dir_z, time}`:
//!   optional, one row per event

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use hdf5::types::H5Type;
use hdf5::{Dataset, File, Group};
use hitbin_core::{Event, EventInfo, HitSet, McTrack};
use ndarray::{s, ArrayView1};

use crate::{Error, Result};

/// Sequential supplier of events.
pub trait EventSource {
    /// Returns the next event, or `None` when exhausted.
    ///
    /// # Errors
    /// Returns an error if the underlying input cannot be read.
    fn next_event(&mut self) -> Result<Option<Event>>;

    /// Total number of events, if known.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Events held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    events: VecDeque<Event>,
}

impl MemorySource {
    #[must_use]
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

impl EventSource for MemorySource {
    fn next_event(&mut self) -> Result<Option<Event>> {
        Ok(self.events.pop_front())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.events.len())
    }
}

struct HitColumns {
    x: Dataset,
    y: Dataset,
    z: Dataset,
    time: Dataset,
    channel_id: Dataset,
    triggered: Dataset,
    is_mc: Dataset,
}

struct TrackColumns {
    particle_type: Vec<i64>,
    energy: Vec<f64>,
    is_cc: Vec<f64>,
    bjorkeny: Vec<f64>,
    dir_x: Vec<f64>,
    dir_y: Vec<f64>,
    dir_z: Vec<f64>,
    time: Vec<f64>,
}

/// Reads events from an HDF5 file one at a time.
///
/// Event headers and MC tracks are loaded on open; hits are read per event.
pub struct Hdf5EventSource {
    _file: File,
    path: PathBuf,
    event_id: Vec<i64>,
    run_id: Vec<i64>,
    trigger_mask: Vec<u64>,
    offsets: Vec<usize>,
    hits: HitColumns,
    tracks: Option<TrackColumns>,
    next: usize,
}

impl Hdf5EventSource {
    /// Opens an event file and checks its layout.
    ///
    /// # Errors
    /// Returns an input error if the file is missing or malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Self::open_inner(&path).map_err(|e| match e {
            Error::CoreError(core) => Error::CoreError(core),
            other => hitbin_core::Error::input(format!("{}: {other}", path.display())).into(),
        })
    }

    fn open_inner(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let events = file.group("events")?;
        let event_id = read_dataset_vec::<i64>(&events, "event_id")?;
        let n = event_id.len();
        let run_id = read_column(&events, "run_id", n)?;
        let trigger_mask = read_column(&events, "trigger_mask", n)?;
        let n_hits = read_column::<u64>(&events, "n_hits", n)?;

        let mut offsets = Vec::with_capacity(n + 1);
        offsets.push(0usize);
        for &count in &n_hits {
            let count = usize::try_from(count)
                .map_err(|_| Error::InvalidFormat("n_hits out of range".to_string()))?;
            let last = offsets.last().copied().unwrap_or(0);
            offsets.push(last + count);
        }
        let total = offsets.last().copied().unwrap_or(0);

        let group = file.group("hits")?;
        let hits = HitColumns {
            x: hit_column(&group, "pos_x", total)?,
            y: hit_column(&group, "pos_y", total)?,
            z: hit_column(&group, "pos_z", total)?,
            time: hit_column(&group, "time", total)?,
            channel_id: hit_column(&group, "channel_id", total)?,
            triggered: hit_column(&group, "triggered", total)?,
            is_mc: hit_column(&group, "is_mc", total)?,
        };

        let tracks = match file.group("mc_tracks") {
            Ok(group) => Some(TrackColumns {
                particle_type: read_column(&group, "particle_type", n)?,
                energy: read_column(&group, "energy", n)?,
                is_cc: read_column(&group, "is_cc", n)?,
                bjorkeny: read_column(&group, "bjorkeny", n)?,
                dir_x: read_column(&group, "dir_x", n)?,
                dir_y: read_column(&group, "dir_y", n)?,
                dir_z: read_column(&group, "dir_z", n)?,
                time: read_column(&group, "time", n)?,
            }),
            Err(_) => None,
        };

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
            event_id,
            run_id,
            trigger_mask,
            offsets,
            hits,
            tracks,
            next: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file carries MC truth.
    #[must_use]
    pub fn has_tracks(&self) -> bool {
        self.tracks.is_some()
    }

    fn read_event(&self, i: usize) -> Result<Event> {
        let (a, b) = (self.offsets[i], self.offsets[i + 1]);
        let flags = |ds: &Dataset| -> Result<Vec<bool>> {
            Ok(read_range::<u8>(ds, a, b)?.into_iter().map(|v| v != 0).collect())
        };
        let hits = HitSet {
            x: read_range(&self.hits.x, a, b)?,
            y: read_range(&self.hits.y, a, b)?,
            z: read_range(&self.hits.z, a, b)?,
            time: read_range(&self.hits.time, a, b)?,
            channel_id: read_range(&self.hits.channel_id, a, b)?,
            triggered: flags(&self.hits.triggered)?,
            is_mc: flags(&self.hits.is_mc)?,
        };
        let info = EventInfo {
            event_id: self.event_id[i],
            run_id: self.run_id[i],
            trigger_mask: self.trigger_mask[i],
        };
        let track = self.tracks.as_ref().map(|t| McTrack {
            particle_type: t.particle_type[i],
            energy: t.energy[i],
            is_cc: t.is_cc[i],
            bjorkeny: t.bjorkeny[i],
            dir_x: t.dir_x[i],
            dir_y: t.dir_y[i],
            dir_z: t.dir_z[i],
            time: t.time[i],
        });
        Ok(Event { info, hits, track })
    }
}

impl EventSource for Hdf5EventSource {
    fn next_event(&mut self) -> Result<Option<Event>> {
        if self.next >= self.event_id.len() {
            return Ok(None);
        }
        let event = self.read_event(self.next)?;
        self.next += 1;
        Ok(Some(event))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.event_id.len())
    }
}

/// Writes events in the layout read by [`Hdf5EventSource`].
///
/// MC tracks are written only if every event has one.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_events_hdf5<P: AsRef<Path>>(path: P, events: &[Event]) -> Result<()> {
    let file = File::create(path)?;

    let group = file.create_group("events")?;
    write_column(&group, "event_id", &collect(events, |e| e.info.event_id))?;
    write_column(&group, "run_id", &collect(events, |e| e.info.run_id))?;
    write_column(&group, "trigger_mask", &collect(events, |e| e.info.trigger_mask))?;
    write_column(&group, "n_hits", &collect(events, |e| e.hits.len() as u64))?;

    let group = file.create_group("hits")?;
    let concat_f64 = |f: fn(&HitSet) -> &Vec<f64>| -> Vec<f64> {
        events.iter().flat_map(|e| f(&e.hits).iter().copied()).collect()
    };
    let concat_flag = |f: fn(&HitSet) -> &Vec<bool>| -> Vec<u8> {
        events
            .iter()
            .flat_map(|e| f(&e.hits).iter().map(|&v| u8::from(v)))
            .collect()
    };
    write_column(&group, "pos_x", &concat_f64(|h| &h.x))?;
    write_column(&group, "pos_y", &concat_f64(|h| &h.y))?;
    write_column(&group, "pos_z", &concat_f64(|h| &h.z))?;
    write_column(&group, "time", &concat_f64(|h| &h.time))?;
    let channel: Vec<u8> = events
        .iter()
        .flat_map(|e| e.hits.channel_id.iter().copied())
        .collect();
    write_column(&group, "channel_id", &channel)?;
    write_column(&group, "triggered", &concat_flag(|h| &h.triggered))?;
    write_column(&group, "is_mc", &concat_flag(|h| &h.is_mc))?;

    let tracks: Option<Vec<McTrack>> = events.iter().map(|e| e.track).collect();
    if let Some(tracks) = tracks.filter(|t| !t.is_empty()) {
        let group = file.create_group("mc_tracks")?;
        write_column(&group, "particle_type", &collect(&tracks, |t| t.particle_type))?;
        write_column(&group, "energy", &collect(&tracks, |t| t.energy))?;
        write_column(&group, "is_cc", &collect(&tracks, |t| t.is_cc))?;
        write_column(&group, "bjorkeny", &collect(&tracks, |t| t.bjorkeny))?;
        write_column(&group, "dir_x", &collect(&tracks, |t| t.dir_x))?;
        write_column(&group, "dir_y", &collect(&tracks, |t| t.dir_y))?;
        write_column(&group, "dir_z", &collect(&tracks, |t| t.dir_z))?;
        write_column(&group, "time", &collect(&tracks, |t| t.time))?;
    }
    Ok(())
}

fn collect<T, U>(items: &[T], f: impl Fn(&T) -> U) -> Vec<U> {
    items.iter().map(f).collect()
}

fn write_column<T: H5Type>(group: &Group, name: &str, values: &[T]) -> Result<()> {
    group
        .new_dataset::<T>()
        .shape((values.len(),))
        .obj_track_times(false)
        .create(name)?
        .write(ArrayView1::from(values))?;
    Ok(())
}

fn read_dataset_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    let dataset = group.dataset(name)?;
    Ok(dataset.read_raw::<T>()?)
}

fn read_column<T: H5Type>(group: &Group, name: &str, expected: usize) -> Result<Vec<T>> {
    let values = read_dataset_vec::<T>(group, name)?;
    if values.len() != expected {
        return Err(Error::InvalidFormat(format!(
            "{}/{name} has {} rows, expected {expected}",
            group.name(),
            values.len()
        )));
    }
    Ok(values)
}

fn hit_column(group: &Group, name: &str, expected: usize) -> Result<Dataset> {
    let dataset = group.dataset(name)?;
    if dataset.size() != expected {
        return Err(Error::InvalidFormat(format!(
            "hits/{name} has {} rows, expected {expected}",
            dataset.size()
        )));
    }
    Ok(dataset)
}

fn read_range<T: H5Type>(dataset: &Dataset, start: usize, end: usize) -> Result<Vec<T>> {
    if start == end {
        return Ok(Vec::new());
    }
    Ok(dataset.read_slice_1d::<T, _>(s![start..end])?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitbin_core::Hit;
    use tempfile::NamedTempFile;

    fn events() -> Vec<Event> {
        vec![
            Event::new(
                EventInfo {
                    event_id: 10,
                    run_id: 3,
                    trigger_mask: 2,
                },
                [Hit::new(1.0, 2.0, 3.0, 4.0).with_channel(5).triggered()]
                    .into_iter()
                    .collect(),
            )
            .with_track(McTrack {
                particle_type: -14,
                energy: 7.5,
                ..McTrack::default()
            }),
            Event::new(EventInfo::default(), HitSet::default()).with_track(McTrack::default()),
            Event::new(
                EventInfo {
                    event_id: 12,
                    run_id: 3,
                    trigger_mask: 0,
                },
                [Hit::new(0.0, 0.0, 0.0, 1.0).mc(), Hit::new(9.0, 9.0, 9.0, 2.0)]
                    .into_iter()
                    .collect(),
            )
            .with_track(McTrack::default()),
        ]
    }

    #[test]
    fn test_hdf5_event_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        let original = events();
        write_events_hdf5(file.path(), &original).unwrap();

        let mut source = Hdf5EventSource::open(file.path()).unwrap();
        assert_eq!(source.len_hint(), Some(3));
        assert!(source.has_tracks());

        let mut read = Vec::new();
        while let Some(event) = source.next_event().unwrap() {
            read.push(event);
        }
        assert_eq!(read, original);
    }

    #[test]
    fn test_hdf5_events_without_tracks() {
        let file = NamedTempFile::new().unwrap();
        let mut original = events();
        original[1].track = None;
        write_events_hdf5(file.path(), &original).unwrap();

        let mut source = Hdf5EventSource::open(file.path()).unwrap();
        assert!(!source.has_tracks());
        assert!(source.next_event().unwrap().unwrap().track.is_none());
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let err = Hdf5EventSource::open("/nonexistent/events.h5").err().unwrap();
        assert!(matches!(
            err,
            Error::CoreError(hitbin_core::Error::Input(_))
        ));
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemorySource::new(events());
        assert_eq!(source.len_hint(), Some(3));
        assert_eq!(source.next_event().unwrap().unwrap().info.event_id, 10);
        source.next_event().unwrap();
        source.next_event().unwrap();
        assert!(source.next_event().unwrap().is_none());
    }
}
