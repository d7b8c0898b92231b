//! Complex packing (templates 2 and 3).
//!
//! Cells are split into groups; each group carries a reference value, a bit
//! width and a length in three header arrays, each padded to an octet
//! boundary. Template 3 prepends first- or second-order spatial differences
//! that have to be integrated after group extraction.

use crate::bitreader::BitReader;
use crate::params::{width_mask, ComplexPackingParams, SpatialDiffParams};
use crate::{Grib2Error, Grib2Result};

use super::bitmap_present;

/// Group headers of a complex-packed payload.
struct GroupHeaders {
    refs: Vec<u32>,
    widths: Vec<u32>,
    lengths: Vec<u32>,
}

fn read_group_headers(reader: &mut BitReader<'_>, params: &ComplexPackingParams) -> GroupHeaders {
    let ng = params.ngroups as usize;
    let mut refs = vec![0u32; ng];
    let ref_width = params.simple.nbits as u32;
    for r in refs.iter_mut() {
        *r = reader.read(ref_width);
    }
    reader.align_octet();
    let mut widths = vec![0u32; ng];
    let width_bits = params.nbits_group_width as u32;
    for w in widths.iter_mut() {
        *w = reader.read(width_bits) + params.ref_group_width as u32;
    }
    reader.align_octet();
    let mut lengths = vec![0u32; ng];
    let length_bits = params.nbits_group_length as u32;
    for l in lengths.iter_mut() {
        *l = reader
            .read(length_bits)
            .wrapping_mul(params.incr_group_length as u32)
            .wrapping_add(params.ref_group_length);
    }
    if let Some(last) = lengths.last_mut() {
        *last = params.last_group_length;
    }
    reader.align_octet();
    GroupHeaders {
        refs,
        widths,
        lengths,
    }
}

/// Walks the group headers while cells are consumed.
struct GroupCursor<'h> {
    headers: &'h GroupHeaders,
    primary_enabled: bool,
    secondary_enabled: bool,
    idx: usize,
    remaining: u32,
    reference: u32,
    width: u32,
    /// Group-local sentinels; `u32::MAX` disables the check.
    primary_sentinel: u32,
    secondary_sentinel: u32,
}

impl<'h> GroupCursor<'h> {
    fn new(headers: &'h GroupHeaders, params: &ComplexPackingParams) -> Self {
        let mut c = Self {
            headers,
            primary_enabled: params.has_primary_missing(),
            secondary_enabled: params.has_secondary_missing(),
            idx: 0,
            remaining: 1,
            reference: 0,
            width: 1,
            primary_sentinel: u32::MAX,
            secondary_sentinel: u32::MAX,
        };
        c.load_group();
        c
    }

    fn load_group(&mut self) {
        self.remaining = 1;
        self.reference = 0;
        self.width = 1;
        self.primary_sentinel = u32::MAX;
        self.secondary_sentinel = u32::MAX;
        if self.idx < self.headers.lengths.len() {
            self.remaining = self.headers.lengths[self.idx];
            self.reference = self.headers.refs[self.idx];
            self.width = self.headers.widths[self.idx];
            if self.width > 0 && self.primary_enabled {
                self.primary_sentinel = width_mask(self.width);
            }
            if self.width > 1 && self.secondary_enabled {
                self.secondary_sentinel = width_mask(self.width).wrapping_sub(1);
            }
        }
    }

    /// Account for one consumed cell, moving to the next group when the
    /// current one is exhausted.
    fn step(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.idx += 1;
            self.load_group();
        }
    }
}

/// One extracted cell before scaling.
enum RawCell {
    Value(u32),
    PrimaryMissing,
    SecondaryMissing,
}

fn extract_cell(
    reader: &mut BitReader<'_>,
    cursor: &GroupCursor<'_>,
    global_primary: u32,
    global_secondary: u32,
) -> RawCell {
    let v = reader.read(cursor.width);
    if v == cursor.primary_sentinel {
        return RawCell::PrimaryMissing;
    }
    if v == cursor.secondary_sentinel {
        return RawCell::SecondaryMissing;
    }
    let v = v.wrapping_add(cursor.reference);
    // the global sentinels are only compared against non-zero values
    if v != 0 {
        if cursor.primary_enabled && v == global_primary {
            return RawCell::PrimaryMissing;
        }
        if cursor.secondary_enabled && v == global_secondary {
            return RawCell::SecondaryMissing;
        }
    }
    RawCell::Value(v)
}

fn check_group_layout(params: &ComplexPackingParams) -> Grib2Result<()> {
    if !params.is_general_group_split() {
        return Err(Grib2Error::UnpackingError(format!(
            "unsupported group splitting method {}",
            params.group_split_method
        )));
    }
    if params.ngroups == 0 {
        return Err(Grib2Error::UnpackingError("no groups".into()));
    }
    Ok(())
}

/// Decode a template-2 payload.
pub fn unpack_complex(
    payload: &[u8],
    bitmap: Option<&[u8]>,
    cell_count: usize,
    params: &ComplexPackingParams,
) -> Grib2Result<Vec<f32>> {
    check_group_layout(params)?;
    let mut reader = BitReader::new(payload);
    let headers = read_group_headers(&mut reader, params);
    let mut cursor = GroupCursor::new(&headers, params);
    let global_primary = params.primary_missing_raw();
    let global_secondary = params.secondary_missing_raw();
    let primary_value = params.primary_missing_value();
    let secondary_value = params.secondary_missing_value();
    let mut data = vec![f32::NAN; cell_count];
    for (i, cell) in data.iter_mut().enumerate() {
        if let Some(bm) = bitmap {
            if !bitmap_present(bm, i) {
                continue;
            }
        }
        *cell = match extract_cell(&mut reader, &cursor, global_primary, global_secondary) {
            RawCell::Value(v) => params.simple.scale.apply(v as f64),
            RawCell::PrimaryMissing => primary_value,
            RawCell::SecondaryMissing => secondary_value,
        };
        cursor.step();
    }
    Ok(data)
}

// Sentinel tags used while integrating spatial differences. They are never
// added to neighbours; integration skips tagged cells.
const TAG_PRIMARY: i64 = i64::MIN;
const TAG_SECONDARY: i64 = i64::MIN + 1;
const TAG_ABSENT: i64 = i64::MIN + 2;

/// Decode a template-3 payload (complex packing with spatial differencing).
pub fn unpack_complex_spatial_diff(
    payload: &[u8],
    bitmap: Option<&[u8]>,
    cell_count: usize,
    params: &SpatialDiffParams,
) -> Grib2Result<Vec<f32>> {
    check_group_layout(&params.complex)?;
    let order = params.order as usize;
    if order == 0 || order > 2 {
        return Err(Grib2Error::UnpackingError(format!(
            "unsupported spatial differencing order {}",
            params.order
        )));
    }
    if params.extra_descriptor_octets == 0 {
        return Err(Grib2Error::UnpackingError(
            "spatial differencing without descriptor octets".into(),
        ));
    }
    if cell_count < order {
        return Err(Grib2Error::UnpackingError(
            "grid smaller than differencing order".into(),
        ));
    }
    let mut reader = BitReader::new(payload);
    // initial values and the signed (sign-magnitude) global minimum, each
    // extra_descriptor_octets wide
    let w = params.extra_descriptor_octets as u32 * 8;
    let mut init = [0i64; 2];
    for v in init.iter_mut().take(order) {
        *v = reader.read(w.min(32)) as i64;
    }
    let overall_min = {
        let sign = reader.read(1);
        let mag = reader.read((w - 1).min(32)) as i64;
        if sign != 0 {
            -mag
        } else {
            mag
        }
    };
    let headers = read_group_headers(&mut reader, &params.complex);
    let mut cursor = GroupCursor::new(&headers, &params.complex);
    let global_primary = params.complex.primary_missing_raw();
    let global_secondary = params.complex.secondary_missing_raw();

    // every non-missing cell starts at the global minimum; group values add
    let mut work = vec![overall_min; cell_count];
    for (i, cell) in work.iter_mut().enumerate() {
        if let Some(bm) = bitmap {
            if !bitmap_present(bm, i) {
                *cell = TAG_ABSENT;
                continue;
            }
        }
        match extract_cell(&mut reader, &cursor, global_primary, global_secondary) {
            RawCell::Value(v) => *cell += v as i64,
            RawCell::PrimaryMissing => *cell = TAG_PRIMARY,
            RawCell::SecondaryMissing => *cell = TAG_SECONDARY,
        }
        cursor.step();
    }

    // integrate the differences; sentinel-tagged cells stay tagged and do
    // not contribute to their neighbours
    match order {
        1 => {
            let mut prev = init[0];
            if work[0] > TAG_ABSENT {
                work[0] = init[0];
            }
            for cell in work.iter_mut().skip(1) {
                if *cell <= TAG_ABSENT {
                    continue;
                }
                let v = *cell + prev;
                prev = v;
                *cell = v;
            }
        }
        _ => {
            let mut prev2 = init[0];
            let mut prev1 = init[1];
            if work[0] > TAG_ABSENT {
                work[0] = init[0];
            }
            if work[1] > TAG_ABSENT {
                work[1] = init[1];
            }
            for cell in work.iter_mut().skip(2) {
                if *cell <= TAG_ABSENT {
                    continue;
                }
                let v = *cell + 2 * prev1 - prev2;
                prev2 = prev1;
                prev1 = v;
                *cell = v;
            }
        }
    }

    let primary_value = params.complex.primary_missing_value();
    let secondary_value = params.complex.secondary_missing_value();
    let mut data = vec![f32::NAN; cell_count];
    for (cell, v) in data.iter_mut().zip(work.iter()) {
        *cell = match *v {
            TAG_PRIMARY => primary_value,
            TAG_SECONDARY => secondary_value,
            TAG_ABSENT => continue,
            v => params.complex.simple.scale.apply(v as f64),
        };
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{PackingScale, SimplePackingParams};

    fn complex_params(
        nbits: u8,
        ngroups: u32,
        nbits_group_width: u8,
        nbits_group_length: u8,
        last_group_length: u32,
        missing_mgmt: u8,
        primary_missing: u32,
    ) -> ComplexPackingParams {
        ComplexPackingParams {
            simple: SimplePackingParams {
                scale: PackingScale::identity(),
                nbits,
                field_value_type: 1,
            },
            group_split_method: 1,
            missing_value_mgmt: missing_mgmt,
            primary_missing,
            secondary_missing: 0,
            ngroups,
            ref_group_width: 0,
            nbits_group_width,
            ref_group_length: 0,
            incr_group_length: 1,
            last_group_length,
            nbits_group_length,
        }
    }

    #[test]
    fn test_two_groups_with_missing() {
        // 10 cells in 2 groups of 5. Group 1: ref 10, width 3, raw
        // [0,1,2,3,7]; group 2: ref 0, width 3, raw [0,0,7,0,0].
        // Missing management 1, primary substitute 9999.
        //
        // refs (4 bits each): 10, 0          -> 0xA0
        // widths (3 bits each): 3, 3         -> 0x6C
        // lengths (8 bits each): 5, 5        -> 0x05 0x05
        // data (3 bits/cell): 000 001 010 011 111 | 000 000 111 000 000
        let payload = [0xa0, 0x6c, 0x05, 0x05, 0x05, 0x3e, 0x07, 0x00];
        let params = complex_params(4, 2, 3, 8, 5, 1, 9999);
        let out = unpack_complex(&payload, None, 10, &params).unwrap();
        assert_eq!(
            out,
            vec![10.0, 11.0, 12.0, 13.0, 9999.0, 0.0, 0.0, 9999.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_zero_width_groups_yield_reference() {
        // all-zero group widths with missing management 0: every cell is the
        // packing reference value
        let params = ComplexPackingParams {
            simple: SimplePackingParams {
                scale: PackingScale::new(42.0, 0, 0),
                nbits: 4,
                field_value_type: 1,
            },
            ..complex_params(4, 1, 3, 8, 6, 0, 0)
        };
        // refs: 0 (4 bits) -> 0x00; widths: 0 -> 0x00; lengths: 6 -> 0x06
        let payload = [0x00, 0x00, 0x06];
        let out = unpack_complex(&payload, None, 6, &params).unwrap();
        assert_eq!(out, vec![42.0; 6]);
    }

    #[test]
    fn test_zero_width_no_spurious_sentinels() {
        // width 0 must not produce missing values even with management 1:
        // the group-local sentinel needs width > 0
        let params = complex_params(4, 1, 3, 8, 4, 1, 0xffff);
        let payload = [0x00, 0x00, 0x04];
        let out = unpack_complex(&payload, None, 4, &params).unwrap();
        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    fn test_bitmap_skips_cells() {
        // one group, width 4, raw values 1..4 for the present cells
        let params = complex_params(4, 1, 4, 8, 4, 0, 0);
        // refs: 0 -> 0x00; widths: 4 -> 0x40; lengths: 4 -> 0x04;
        // data: 0001 0010 0011 0100
        let payload = [0x00, 0x40, 0x04, 0x12, 0x34];
        // bitmap 1011_0100: cells 0,2,3,5 present
        let out = unpack_complex(&payload, Some(&[0xb4]), 8, &params).unwrap();
        assert_eq!(out[0], 1.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(out[3], 3.0);
        assert!(out[4].is_nan());
        assert_eq!(out[5], 4.0);
        assert!(out[6].is_nan());
        assert!(out[7].is_nan());
    }

    fn spatial_params(order: u8, complex: ComplexPackingParams) -> SpatialDiffParams {
        SpatialDiffParams {
            complex,
            order,
            extra_descriptor_octets: 2,
        }
    }

    #[test]
    fn test_spatial_diff_order2() {
        // init 100, 102, overall minimum 0, all group values zero
        // -> 100, 102, 104, 106, 108, 110
        let params = spatial_params(2, complex_params(4, 1, 3, 8, 6, 0, 0));
        let payload = [
            0x00, 0x64, // init0 = 100
            0x00, 0x66, // init1 = 102
            0x00, 0x00, // min = +0
            0x00, // refs: 0 (4 bits, padded)
            0x00, // widths: 0
            0x06, // lengths: 6
        ];
        let out = unpack_complex_spatial_diff(&payload, None, 6, &params).unwrap();
        assert_eq!(out, vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0]);
    }

    #[test]
    fn test_spatial_diff_order1_minimum_integrates() {
        // order 1, init 7, overall minimum 3, zero group values:
        // 7, 10, 13, 16
        let params = spatial_params(1, complex_params(4, 1, 3, 8, 4, 0, 0));
        let payload = [
            0x00, 0x07, // init0 = 7
            0x00, 0x03, // min = +3
            0x00, // refs
            0x00, // widths
            0x04, // lengths
        ];
        let out = unpack_complex_spatial_diff(&payload, None, 4, &params).unwrap();
        assert_eq!(out, vec![7.0, 10.0, 13.0, 16.0]);
    }

    #[test]
    fn test_spatial_diff_negative_minimum() {
        // sign-magnitude minimum: sign bit set, magnitude 2 -> -2
        let params = spatial_params(1, complex_params(4, 1, 3, 8, 4, 0, 0));
        let payload = [
            0x00, 0x0a, // init0 = 10
            0x80, 0x02, // min = -2
            0x00, 0x00, 0x04,
        ];
        let out = unpack_complex_spatial_diff(&payload, None, 4, &params).unwrap();
        assert_eq!(out, vec![10.0, 8.0, 6.0, 4.0]);
    }

    #[test]
    fn test_rejects_bad_layout() {
        let mut params = complex_params(4, 0, 3, 8, 0, 0, 0);
        assert!(unpack_complex(&[], None, 4, &params).is_err());
        params.ngroups = 1;
        params.group_split_method = 0;
        assert!(unpack_complex(&[], None, 4, &params).is_err());
    }
}
