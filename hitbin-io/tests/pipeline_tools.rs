use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use hitbin_core::{
    Compression, DataCutConfig, Event, EventInfo, Hit, HitSet, McTrack, ProjectionSet, RunConfig,
    StatsConfig,
};
use hitbin_io::{
    concat, read_stats_json, shuffle, write_events_hdf5, ContainerReader, FileBinner,
    GeometrySource, JsonGeometry, StorageOverrides,
};
use tempfile::tempdir;

fn write_geometry(dir: &Path) -> PathBuf {
    let mut positions = Vec::new();
    for x in 0..4 {
        for y in 0..4 {
            for z in 0..6 {
                positions.push([
                    12.0 * f64::from(x),
                    12.0 * f64::from(y),
                    40.0 + 9.0 * f64::from(z),
                ]);
            }
        }
    }
    let path = dir.join("detector.json");
    JsonGeometry::write(&path, &positions).unwrap();
    path
}

fn events(offset: i64, n: i64) -> Vec<Event> {
    (0..n)
        .map(|i| {
            let id = offset + i;
            let base = 1000.0 + 10.0 * id as f64;
            let mut hits = HitSet::with_capacity(6);
            for k in 0..6 {
                let k_f = f64::from(k);
                let hit = Hit::new(3.0 + 6.0 * k_f, 20.0, 45.0 + 8.0 * k_f, base + 40.0 * k_f)
                    .with_channel(u8::try_from(k).unwrap());
                hits.push(if k < 2 { hit.triggered() } else { hit });
            }
            Event::new(
                EventInfo {
                    event_id: id,
                    run_id: 9,
                    trigger_mask: 1,
                },
                hits,
            )
            .with_track(McTrack {
                particle_type: 14,
                energy: 2.0 + id as f64,
                dir_z: 1.0,
                ..McTrack::default()
            })
        })
        .collect()
}

fn config(export: &Path) -> RunConfig {
    RunConfig::default()
        .with_n_bins([4, 4, 6, 20])
        .with_projections(ProjectionSet::ThreeD)
        .with_prod_ident(3)
        .with_flush_rows(3)
        .with_chunk_rows(4)
        .with_stats(StatsConfig {
            sample_every: Some(1),
            export_json: Some(export.to_path_buf()),
        })
        .with_data_cut(DataCutConfig {
            throw_away_prob: 0.3,
            ..DataCutConfig::default()
        })
}

#[test]
fn test_multi_file_run_and_tools() {
    let dir = tempdir().unwrap();
    let geometry = JsonGeometry::new(write_geometry(dir.path())).load().unwrap();
    let inputs = vec![dir.path().join("a.h5"), dir.path().join("b.h5")];
    write_events_hdf5(&inputs[0], &events(0, 10)).unwrap();
    write_events_hdf5(&inputs[1], &events(100, 7)).unwrap();

    let export = dir.path().join("stats.json");
    let binner = FileBinner::new(config(&export), &geometry).unwrap();
    let out = dir.path().join("out");
    let batch = binner.run_files(&inputs, &out).unwrap();

    let summary = &batch.summary;
    assert_eq!(summary.events_read, 17);
    assert_eq!(
        summary.events_written + summary.skipped_thrown_away,
        summary.events_read
    );
    assert_eq!(summary.outputs.len(), 10);

    // Merged statistics are exported and cover every event of both files.
    let stats = batch.stats.unwrap();
    assert_eq!(stats.seen(), 17);
    assert_eq!(read_stats_json(&export).unwrap(), stats);

    let a = ContainerReader::open(out.join("a_xzt.h5")).unwrap();
    let b = ContainerReader::open(out.join("b_xzt.h5")).unwrap();
    assert_eq!(a.rows() + b.rows(), summary.events_written);
    assert_eq!(a.info().chunk_rows, 4);
    assert_eq!(a.info().compression, Compression::Gzip(1));
    assert_eq!(a.info().fields.last().map(String::as_str), Some("prod_ident"));

    // Concatenation keeps the order and inherits storage settings.
    let joined = dir.path().join("joined.h5");
    let paths = vec![out.join("a_xzt.h5"), out.join("b_xzt.h5")];
    let rows = concat(&paths, &joined, &StorageOverrides::default()).unwrap();
    assert_eq!(rows, a.rows() + b.rows());
    let c = ContainerReader::open(&joined).unwrap();
    assert_eq!(c.info().chunk_rows, 4);
    assert_eq!(c.info().projection.as_deref(), Some("xzt"));
    assert_eq!(c.read_images(0..a.rows()).unwrap(), a.read_images(0..a.rows()).unwrap());
    assert_eq!(
        c.read_metadata(a.rows()..rows).unwrap(),
        b.read_metadata(0..b.rows()).unwrap()
    );
    assert!(c.info().has_bin_stats);

    // Shuffling permutes rows but keeps each image with its metadata.
    let shuffled = dir.path().join("shuffled.h5");
    let overrides = StorageOverrides {
        compression: Some(Compression::Lzf),
        block_rows: 2,
        ..StorageOverrides::default()
    };
    assert_eq!(shuffle(&joined, &shuffled, 42, &overrides).unwrap(), rows);
    let s = ContainerReader::open(&shuffled).unwrap();
    assert_eq!(s.info().compression, Compression::Lzf);

    let id_col = c.info().fields.iter().position(|f| f == "event_id").unwrap();
    let original_meta = c.read_metadata(0..rows).unwrap();
    let shuffled_meta = s.read_metadata(0..rows).unwrap();
    let mut original_ids: Vec<i64> = original_meta.column(id_col).iter().map(|&v| v as i64).collect();
    let mut shuffled_ids: Vec<i64> = shuffled_meta.column(id_col).iter().map(|&v| v as i64).collect();
    for (row, id) in shuffled_ids.iter().enumerate() {
        let source_row = original_ids.iter().position(|v| v == id).unwrap();
        assert_eq!(
            s.read_images(row..row + 1).unwrap(),
            c.read_images(source_row..source_row + 1).unwrap()
        );
    }
    original_ids.sort_unstable();
    shuffled_ids.sort_unstable();
    assert_eq!(original_ids, shuffled_ids);
}

#[test]
fn test_runs_are_deterministic() {
    let dir = tempdir().unwrap();
    let geometry = JsonGeometry::new(write_geometry(dir.path())).load().unwrap();
    let input = dir.path().join("ev.h5");
    write_events_hdf5(&input, &events(0, 12)).unwrap();

    let export = dir.path().join("stats.json");
    let mut outputs = Vec::new();
    for run in 0..2 {
        if run > 0 {
            // Containers written a second later must not differ in any timestamp.
            thread::sleep(Duration::from_millis(1100));
        }
        let out = dir.path().join(format!("run{run}"));
        let binner = FileBinner::new(config(&export), &geometry).unwrap();
        let outcome = binner.run_file(&input, &out).unwrap();
        outputs.push(outcome.summary.outputs);
    }

    assert_eq!(outputs[0].len(), 5);
    for (first, second) in outputs[0].iter().zip(&outputs[1]) {
        assert_eq!(first.file_name(), second.file_name());
        assert!(
            fs::read(first).unwrap() == fs::read(second).unwrap(),
            "{} differs between runs",
            first.display()
        );
    }
}

#[test]
fn test_missing_later_input_creates_no_container() {
    let dir = tempdir().unwrap();
    let geometry = JsonGeometry::new(write_geometry(dir.path())).load().unwrap();
    let inputs = vec![dir.path().join("a.h5"), dir.path().join("missing.h5")];
    write_events_hdf5(&inputs[0], &events(0, 4)).unwrap();

    let export = dir.path().join("stats.json");
    let binner = FileBinner::new(config(&export), &geometry).unwrap();
    let out = dir.path().join("out");
    let err = binner.run_files(&inputs, &out).unwrap_err();
    assert!(matches!(
        err,
        hitbin_io::Error::CoreError(hitbin_core::Error::Input(_))
    ));
    assert!(!out.exists() || fs::read_dir(&out).unwrap().next().is_none());
    assert!(!export.exists());
}

#[test]
fn test_missing_input_creates_no_container() {
    let dir = tempdir().unwrap();
    let geometry = JsonGeometry::new(write_geometry(dir.path())).load().unwrap();
    let binner = FileBinner::new(RunConfig::default(), &geometry).unwrap();
    let out = dir.path().join("out");
    let err = binner
        .run_file(&dir.path().join("missing.h5"), &out)
        .unwrap_err();
    assert!(matches!(
        err,
        hitbin_io::Error::CoreError(hitbin_core::Error::Input(_))
    ));
    assert!(!out.join("missing_xyzt.h5").exists());
}
