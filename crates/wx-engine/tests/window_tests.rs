//! Bounding-box to grid-window projection, including the longitude wrap.

mod common;

use grib2_decoder::testdata::MessageBuilder;
use wx_common::rect::Rect;

use common::{registry_in, write_grib};

/// Global 1° grid, 360x181, cell value = column index, scanned west->east
/// south->north from (90S, 0E).
fn global_message() -> MessageBuilder {
    MessageBuilder {
        ni: 360,
        nj: 181,
        lat1_micro: -90_000_000,
        lon1_micro: 0,
        lat2_micro: 90_000_000,
        lon2_micro: 359_000_000,
        di_micro: 1_000_000,
        dj_micro: 1_000_000,
        nbits: 16,
        raw_values: (0..181u32).flat_map(|_| 0..360u32).collect(),
        ..Default::default()
    }
}

#[test]
fn test_antimeridian_window_wraps_columns() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let path = write_grib(tmp.path(), "global.grib2", &[global_message().build()]);
    assert_eq!(registry.parse_file(&path).unwrap(), 1);
    let layer = registry.find_layers().pop().unwrap();
    // a band across the prime antipode of the grid origin: lon -1..1
    let bbox = Rect::from_deg(-10.0, -1.0, 10.0, 1.0);
    let result = layer.get_results(&bbox).unwrap();
    assert_eq!(result.width(), 3, "expected columns 359, 0, 1");
    for y in 0..result.height() {
        assert_eq!(result.get(0, y), 359.0);
        assert_eq!(result.get(1, y), 0.0);
        assert_eq!(result.get(2, y), 1.0);
    }
}

#[test]
fn test_interior_window() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let path = write_grib(tmp.path(), "global.grib2", &[global_message().build()]);
    registry.parse_file(&path).unwrap();
    let layer = registry.find_layers().pop().unwrap();
    let bbox = Rect::from_deg(0.0, 10.0, 2.0, 12.0);
    let result = layer.get_results(&bbox).unwrap();
    assert!(result.width() >= 2 && result.width() <= 4, "{}", result.width());
    // all cells carry their column index; the window starts near column 10
    let first = result.get(0, 0);
    assert!((9.0..=11.0).contains(&first), "first column {first}");
    // consecutive columns increase by one
    assert_eq!(result.get(1, 0), first + 1.0);
}

#[test]
fn test_disjoint_bbox_still_returns_grid_edge() {
    // clamping pulls a far-away query onto the grid edge rather than
    // failing; values are defined everywhere on a global grid
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let path = write_grib(tmp.path(), "global.grib2", &[global_message().build()]);
    registry.parse_file(&path).unwrap();
    let layer = registry.find_layers().pop().unwrap();
    let bbox = Rect::from_deg(89.9, 0.0, 90.0, 1.0);
    let result = layer.get_results(&bbox).unwrap();
    assert!(result.width() >= 1);
    assert!(result.height() >= 1);
}

#[test]
fn test_minimal_grid_roundtrip() {
    // 2x2 grid queries correctly
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let builder = MessageBuilder {
        ni: 2,
        nj: 2,
        lat1_micro: 10_000_000,
        lon1_micro: 20_000_000,
        lat2_micro: 11_000_000,
        lon2_micro: 21_000_000,
        nbits: 8,
        raw_values: vec![1, 2, 3, 4],
        ..Default::default()
    };
    let path = write_grib(tmp.path(), "tiny.grib2", &[builder.build()]);
    registry.parse_file(&path).unwrap();
    let layer = registry.find_layers().pop().unwrap();
    let bbox = Rect::from_deg(9.5, 19.5, 11.5, 21.5);
    let result = layer.get_results(&bbox).unwrap();
    assert_eq!(result.width(), 2);
    assert_eq!(result.height(), 2);
    assert_eq!(result.get(0, 0), 1.0);
    assert_eq!(result.get(1, 0), 2.0);
    assert_eq!(result.get(0, 1), 3.0);
    assert_eq!(result.get(1, 1), 4.0);
}
