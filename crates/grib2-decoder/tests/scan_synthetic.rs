//! Integration tests scanning synthetic GRIB2 files.

use bytes::Bytes;

use grib2_decoder::testdata::MessageBuilder;
use grib2_decoder::unpacking::unpack_simple;
use grib2_decoder::{Grib2Scanner, PackingParams};

fn scan(bytes: Vec<u8>) -> Vec<grib2_decoder::LayerDescriptor> {
    Grib2Scanner::from_bytes(Bytes::from(bytes), "synthetic.grib2").scan()
}

#[test]
fn test_scan_single_message() {
    let builder = MessageBuilder {
        category: 0,
        number: 0, // TMP
        time_unit: 1,
        forecast_time: 6,
        surface1_type: 100,
        surface1_scale: 0,
        surface1_value: 85_000,
        ..Default::default()
    };
    let layers = scan(builder.build());
    assert_eq!(layers.len(), 1);
    let layer = &layers[0];
    assert_eq!(layer.parameter.abbrev, "TMP");
    assert_eq!(layer.centre, 7);
    assert_eq!(layer.surface1.kind, 100);
    assert!((layer.surface1.value - 85_000.0).abs() < 1e-9);
    assert_eq!(layer.surface2.kind, 255);
    assert_eq!(layer.efftime - layer.reftime, 6 * 3600);
    assert_eq!(layer.grid.ucount(), 4);
    assert_eq!(layer.grid.vcount(), 4);
    assert!(matches!(layer.packing, PackingParams::Simple(_)));
}

#[test]
fn test_grid_geometry_south_north() {
    // scanning mode 0x40: +i, +j, origin at (lat1, lon1)
    let builder = MessageBuilder::default();
    let layers = scan(builder.build());
    let grid = &layers[0].grid;
    let origin = grid.center(0, 0);
    assert!((origin.lat_deg() - 40.0).abs() < 1e-5);
    assert!((origin.lon_deg() - 10.0).abs() < 1e-5);
    let far = grid.center(3, 3);
    assert!((far.lat_deg() - 43.0).abs() < 1e-5);
    assert!((far.lon_deg() - 13.0).abs() < 1e-5);
    // +i consecutive: storage index walks east first
    assert_eq!(grid.index(0, 0), 0);
    assert_eq!(grid.index(1, 0), 1);
    assert_eq!(grid.index(0, 1), 4);
}

#[test]
fn test_grid_geometry_north_south() {
    // scanning mode 0: +i, -j; the first row in the file is the north edge
    let builder = MessageBuilder {
        scanning_mode: 0,
        lat1_micro: 43_000_000,
        lat2_micro: 40_000_000,
        ..Default::default()
    };
    let layers = scan(builder.build());
    let grid = &layers[0].grid;
    // origin stays the south-west cell
    let origin = grid.center(0, 0);
    assert!((origin.lat_deg() - 40.0).abs() < 1e-5);
    // the south row lives at the end of storage
    assert_eq!(grid.index(0, 0), 12);
    assert_eq!(grid.index(0, 3), 0);
}

#[test]
fn test_derived_increments() {
    // resolution flags 0: Di/Dj derived from the endpoints
    let builder = MessageBuilder {
        resolution_flags: 0,
        di_micro: 0,
        dj_micro: 0,
        ..Default::default()
    };
    let layers = scan(builder.build());
    let grid = &layers[0].grid;
    let step = grid.point_size();
    assert!((step.lat_deg() - 1.0).abs() < 1e-4);
    assert!((step.lon_deg() - 1.0).abs() < 1e-4);
}

#[test]
fn test_two_messages_share_grid() {
    let a = MessageBuilder::default();
    let b = MessageBuilder {
        number: 6, // DPT on the same grid
        ..Default::default()
    };
    let mut file = a.build();
    file.extend_from_slice(&b.build());
    let layers = scan(file);
    assert_eq!(layers.len(), 2);
    assert!(std::sync::Arc::ptr_eq(&layers[0].grid, &layers[1].grid));
}

#[test]
fn test_unknown_parameter_is_skipped() {
    let builder = MessageBuilder {
        category: 200,
        number: 250,
        ..Default::default()
    };
    assert!(scan(builder.build()).is_empty());
}

#[test]
fn test_truncated_file_keeps_earlier_layers() {
    let mut file = MessageBuilder::default().build();
    let second = MessageBuilder::default().build();
    file.extend_from_slice(&second[..second.len() / 2]);
    let layers = scan(file);
    assert_eq!(layers.len(), 1);
}

#[test]
fn test_bad_message_is_skipped() {
    let good = MessageBuilder::default();
    let bad = MessageBuilder {
        // Ni*Nj will not match the data point count
        ni: 3,
        ..Default::default()
    };
    let mut corrupt = bad.build();
    // restore the advertised point count to 16 while the grid is 3x4
    // (section 3 body starts at offset 16+5; ndata is bytes 1..5 of it)
    let ndata_off = 16 + 5 + 1;
    corrupt[ndata_off..ndata_off + 4].copy_from_slice(&16u32.to_be_bytes());
    let mut file = corrupt;
    file.extend_from_slice(&good.build());
    let layers = scan(file);
    assert_eq!(layers.len(), 1);
}

#[test]
fn test_payload_round_trip() {
    // values 0..15 packed at 8 bits decode back through unpack_simple
    let builder = MessageBuilder {
        nbits: 8,
        raw_values: (0u32..16).collect(),
        ..Default::default()
    };
    let bytes = builder.build();
    let layers = scan(bytes.clone());
    let layer = &layers[0];
    let payload = &bytes
        [layer.payload.offset as usize..(layer.payload.offset + layer.payload.len as u64) as usize];
    let params = match layer.packing {
        PackingParams::Simple(p) => p,
        _ => panic!("expected simple packing"),
    };
    let values = unpack_simple(payload, None, layer.grid.cell_count(), &params);
    for (i, v) in values.iter().enumerate() {
        assert_eq!(*v, i as f32);
    }
}

#[test]
fn test_bitmap_locator() {
    let builder = MessageBuilder {
        // 16 cells, half present
        bitmap: Some(vec![0xaa, 0xaa]),
        raw_values: vec![1; 8],
        ..Default::default()
    };
    let bytes = builder.build();
    let layers = scan(bytes.clone());
    let layer = &layers[0];
    let bm = layer.bitmap.expect("bitmap present");
    assert_eq!(bm.len, 2);
    assert_eq!(&bytes[bm.offset as usize..bm.offset as usize + 2], &[0xaa, 0xaa]);
}
