//! Simple packing (data representation template 0).

use crate::bitreader::BitReader;
use crate::params::SimplePackingParams;

use super::bitmap_present;

/// Decode a simple-packed payload: a plain stream of `nbits`-wide cells in
/// scanning order. With `nbits == 0` every present cell carries the
/// reference value.
pub fn unpack_simple(
    payload: &[u8],
    bitmap: Option<&[u8]>,
    cell_count: usize,
    params: &SimplePackingParams,
) -> Vec<f32> {
    let mut data = vec![f32::NAN; cell_count];
    let mut reader = BitReader::new(payload);
    let width = params.nbits as u32;
    for (i, cell) in data.iter_mut().enumerate() {
        if let Some(bm) = bitmap {
            if !bitmap_present(bm, i) {
                continue;
            }
        }
        *cell = params.scale.apply(reader.read(width) as f64);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PackingScale;

    fn params(nbits: u8, reference: f32, e: i16, d: i16) -> SimplePackingParams {
        SimplePackingParams {
            scale: PackingScale::new(reference, e, d),
            nbits,
            field_value_type: 0,
        }
    }

    #[test]
    fn test_four_by_four_identity() {
        // 16 cells of 8 bits, R=0, E=0, D=0, values 0..15
        let payload: Vec<u8> = (0u8..16).collect();
        let out = unpack_simple(&payload, None, 16, &params(8, 0.0, 0, 0));
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, i as f32);
        }
    }

    #[test]
    fn test_zero_bits_constant_field() {
        let out = unpack_simple(&[], None, 6, &params(0, 271.5, 3, 0));
        for v in out {
            assert_eq!(v, 271.5);
        }
    }

    #[test]
    fn test_scaling() {
        // value = (100 + v*2^1) * 10^-1
        let payload = [5u8];
        let out = unpack_simple(&payload, None, 1, &params(8, 100.0, 1, 1));
        assert!((out[0] - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_bitmap_masks_cells() {
        // bitmap 1010_0000: cells 0 and 2 present
        let payload = [7u8, 9u8];
        let out = unpack_simple(&payload, Some(&[0xa0]), 4, &params(8, 0.0, 0, 0));
        assert_eq!(out[0], 7.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 9.0);
        assert!(out[3].is_nan());
    }

    #[test]
    fn test_short_payload_reads_zero() {
        let payload = [1u8];
        let out = unpack_simple(&payload, None, 3, &params(8, 0.0, 0, 0));
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 0.0);
    }
}
