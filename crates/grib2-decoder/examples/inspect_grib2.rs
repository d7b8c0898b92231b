//! List the layers of a GRIB2 file.
//!
//! Usage: cargo run --example inspect_grib2 -- <file.grib2>

use chrono::{DateTime, Utc};

use grib2_decoder::{tables, Grib2Scanner};

fn main() {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: inspect_grib2 <file.grib2>");
        std::process::exit(2);
    };
    let mut scanner = match Grib2Scanner::open(&path) {
        Ok(scanner) => scanner,
        Err(err) => {
            eprintln!("{path}: {err}");
            std::process::exit(1);
        }
    };
    let layers = scanner.scan();
    println!("{path}: {} layers", layers.len());
    for layer in &layers {
        let reftime = DateTime::<Utc>::from_timestamp(layer.reftime, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".into());
        let efftime = DateTime::<Utc>::from_timestamp(layer.efftime, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".into());
        println!(
            "  {:>8} [{:>6}] {:>5}x{:<5} ref {} eff {} {} {} {} (repr {})",
            layer.parameter.abbrev,
            layer.parameter.unit,
            layer.grid.ucount(),
            layer.grid.vcount(),
            reftime,
            efftime,
            tables::surface_type_str(layer.surface1.kind, "?"),
            layer.surface1.value,
            tables::surface_unit_str(layer.surface1.kind, ""),
            layer.packing.template_number(),
        );
    }
}
