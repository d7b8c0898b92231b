//! Registry maintenance: deduplication, obsolete and missing sweeps, the
//! payload cache life cycle.

mod common;

use grib2_decoder::testdata::MessageBuilder;
use wx_common::rect::Rect;

use common::{registry_in, write_grib};

#[test]
fn test_duplicate_layers_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let msg = MessageBuilder::default().build();
    let path = write_grib(tmp.path(), "a.grib2", &[msg.clone()]);
    assert_eq!(registry.parse_file(&path).unwrap(), 1);
    // the same message again carries the same key
    let path2 = write_grib(tmp.path(), "b.grib2", &[msg]);
    assert_eq!(registry.parse_file(&path2).unwrap(), 0);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_remove_obsolete_keeps_newest_reference_time() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    // same effective time from two runs: 06z+6h and 12z+0h
    let older = MessageBuilder {
        hour: 6,
        forecast_time: 6,
        ..Default::default()
    };
    let newer = MessageBuilder {
        hour: 12,
        forecast_time: 0,
        ..Default::default()
    };
    let path = write_grib(tmp.path(), "runs.grib2", &[older.build(), newer.build()]);
    assert_eq!(registry.parse_file(&path).unwrap(), 2);

    assert_eq!(registry.remove_obsolete_layers(), 1);
    let layers = registry.find_layers();
    assert_eq!(layers.len(), 1);
    // the newer run survives
    let reftime = layers[0].reftime();
    let efftime = layers[0].efftime();
    assert_eq!(efftime, reftime, "12z run has zero lead");

    // idempotent
    assert_eq!(registry.remove_obsolete_layers(), 0);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_remove_missing_layers() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let path = write_grib(tmp.path(), "gone.grib2", &[MessageBuilder::default().build()]);
    registry.parse_file(&path).unwrap();
    assert_eq!(registry.remove_missing_layers(), 0);

    std::fs::remove_file(&path).unwrap();
    assert_eq!(registry.remove_missing_layers(), 1);
    assert!(registry.is_empty());
}

#[test]
fn test_parse_directory_recurses() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let sub = tmp.path().join("data").join("gfs");
    std::fs::create_dir_all(&sub).unwrap();
    write_grib(&sub, "one.grib2", &[MessageBuilder::default().build()]);
    write_grib(
        &sub,
        "two.grib2",
        &[MessageBuilder {
            number: 6,
            ..Default::default()
        }
        .build()],
    );
    let added = registry.parse_path(tmp.path().join("data")).unwrap();
    assert_eq!(added, 2);
}

#[test]
fn test_negative_cache_until_expired() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let msg = MessageBuilder {
        nbits: 8,
        raw_values: vec![7; 16],
        ..Default::default()
    }
    .build();
    let path = write_grib(tmp.path(), "vanish.grib2", &[msg.clone()]);
    registry.parse_file(&path).unwrap();
    let layer = registry.find_layers().pop().unwrap();
    let bbox = Rect::from_deg(40.0, 10.0, 43.0, 13.0);

    // break the source, load fails and is negatively cached
    std::fs::remove_file(&path).unwrap();
    assert!(layer.get_results(&bbox).is_none());
    std::fs::write(&path, &msg).unwrap();
    assert!(
        layer.get_results(&bbox).is_none(),
        "negative cache must refuse the retry"
    );

    // manual expiry clears the negative mark
    layer.expire_now();
    let result = layer.get_results(&bbox).expect("load after expire_now");
    assert_eq!(result.get(0, 0), 7.0);
}

#[test]
fn test_expire_now_drops_decoded_data() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let path = write_grib(
        tmp.path(),
        "tmp.grib2",
        &[MessageBuilder {
            nbits: 8,
            raw_values: vec![3; 16],
            ..Default::default()
        }
        .build()],
    );
    registry.parse_file(&path).unwrap();
    let layer = registry.find_layers().pop().unwrap();
    let bbox = Rect::from_deg(40.0, 10.0, 43.0, 13.0);
    assert!(layer.get_results(&bbox).is_some());
    assert!(layer.is_cached());
    layer.expire_now();
    assert!(!layer.is_cached());
    // reloads fine afterwards
    assert!(layer.get_results(&bbox).is_some());
}

#[test]
fn test_layer_ordering_is_total() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let mut messages = Vec::new();
    for (number, level) in [(0u8, 50_000u32), (0, 85_000), (2, 85_000), (0, 100_000)] {
        messages.push(
            MessageBuilder {
                category: 0,
                number,
                surface1_type: 100,
                surface1_value: level,
                ..Default::default()
            }
            .build(),
        );
    }
    let path = write_grib(tmp.path(), "many.grib2", &[messages.concat()]);
    assert_eq!(registry.parse_file(&path).unwrap(), 4);
    let layers = registry.find_layers();
    // ordered by parameter first, then surface value
    let keys: Vec<(u8, f64)> = layers
        .iter()
        .map(|l| (l.parameter().id, l.surface1().value))
        .collect();
    assert_eq!(
        keys,
        vec![(0, 50_000.0), (0, 85_000.0), (0, 100_000.0), (2, 85_000.0)]
    );
}

#[test]
fn test_find_layers_at_picks_bracketing_times() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let mut messages = Vec::new();
    // TMP at two pressure levels for three forecast hours
    for hour in [0u32, 3, 6] {
        for level in [50_000u32, 85_000] {
            messages.push(
                MessageBuilder {
                    forecast_time: hour,
                    surface1_type: 100,
                    surface1_value: level,
                    ..Default::default()
                }
                .build(),
            );
        }
    }
    let path = write_grib(tmp.path(), "stack.grib2", &[messages.concat()]);
    assert_eq!(registry.parse_file(&path).unwrap(), 6);

    let parameter = grib2_decoder::tables::find_parameter(0, 0, 0).unwrap();
    let reftime = registry.find_layers()[0].reftime();
    // between the +0h and +3h frames: both surfaces at each bracket
    let found = registry.find_layers_at(parameter, reftime + 3600);
    assert_eq!(found.len(), 4);
    let mut efftimes: Vec<i64> = found.iter().map(|l| l.efftime() - reftime).collect();
    efftimes.sort();
    assert_eq!(efftimes, vec![0, 0, 3 * 3600, 3 * 3600]);

    // before the first frame there is no "below" snapshot
    let found = registry.find_layers_at(parameter, reftime - 1);
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|l| l.efftime() == reftime));
}
