use hitbin_algorithms::{
    CutDecision, DataCutPolicy, HistogramProjector, McInfoMaker, TimeCutPolicy,
};
use hitbin_core::config::{DataCutConfig, TriggerPreset};
use hitbin_core::{
    DetectorGeometry, Event, EventInfo, GeometryBinPlanner, GeometryProfile, Hit, HitSet, McTrack,
    ProjectionSet,
};

fn geometry() -> DetectorGeometry {
    let mut positions = Vec::new();
    for line in 0..4 {
        for floor in 0..5 {
            positions.push([
                20.0 * f64::from(line % 2),
                20.0 * f64::from(line / 2),
                40.0 + 9.0 * f64::from(floor),
            ]);
        }
    }
    DetectorGeometry::new(positions).unwrap()
}

fn event(id: i64, energy: f64) -> Event {
    let mut hits = HitSet::with_capacity(8);
    for i in 0..8 {
        let t = 1000.0 + 50.0 * f64::from(i);
        let hit = Hit::new(10.0, 10.0, 50.0, t).with_channel(3);
        hits.push(if i < 3 { hit.triggered() } else { hit });
    }
    // Far outside any trigger window.
    hits.push(Hit::new(10.0, 10.0, 50.0, 9000.0));
    Event::new(
        EventInfo {
            event_id: id,
            run_id: 1,
            trigger_mask: 0,
        },
        hits,
    )
    .with_track(McTrack {
        particle_type: 12,
        energy,
        ..McTrack::default()
    })
}

#[test]
fn test_retained_events_produce_one_image_and_record_each() {
    let edges = GeometryBinPlanner::new(GeometryProfile::default(), [2, 2, 5])
        .unwrap()
        .plan(&geometry())
        .unwrap();
    let projector =
        HistogramProjector::new(edges, 10, 31, ProjectionSet::TwoD.projections()).unwrap();
    let time_cut = TimeCutPolicy::trigger_cluster(TriggerPreset::All);
    let mut data_cut = DataCutPolicy::new(
        DataCutConfig {
            energy_lower: Some(5.0),
            ..DataCutConfig::default()
        },
        42,
    );
    let mut info = McInfoMaker::builtin("neutrino", Some(2)).unwrap();

    let events = [event(0, 4.9), event(1, 5.1), event(2, 30.0)];
    let mut images = Vec::new();
    let mut records = Vec::new();
    for ev in &events {
        if data_cut.evaluate(ev) != CutDecision::Retain {
            continue;
        }
        let (window, hits) = time_cut.apply(&ev.hits);
        images.push(projector.project(&hits, window.as_ref()).unwrap());
        records.push(info.make(ev).unwrap());
    }

    assert_eq!(images.len(), 2);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("event_id"), Some(1.0));
    for per_event in &images {
        assert_eq!(per_event.len(), 6);
        for image in per_event {
            // The late hit is cut by the window, the rest land inside.
            assert_eq!(image.total(), 8, "{}", image.projection);
        }
    }
}
