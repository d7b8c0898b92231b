//! JPEG-2000 codestream decoding (data representation template 40).
//!
//! The payload of a template-40 layer is a raw J2K codestream holding one
//! signed-integer component. OpenJPEG does the entropy decoding; this module
//! wraps the C API behind a safe function and applies the GRIB2 bitmap and
//! linear scaling to the decoded samples.

use std::os::raw::c_void;

use crate::params::Jpeg2000Params;
use crate::{Grib2Error, Grib2Result};

use super::bitmap_present;

/// One decoded image component.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<i32>,
}

struct MemStream<'a> {
    data: &'a [u8],
    pos: usize,
}

unsafe extern "C" fn mem_read(buffer: *mut c_void, nb_bytes: usize, user: *mut c_void) -> usize {
    let stream = &mut *(user as *mut MemStream<'_>);
    if stream.pos >= stream.data.len() {
        return usize::MAX; // OpenJPEG's end-of-stream marker, (OPJ_SIZE_T)-1
    }
    let n = nb_bytes.min(stream.data.len() - stream.pos);
    std::ptr::copy_nonoverlapping(
        stream.data.as_ptr().add(stream.pos),
        buffer as *mut u8,
        n,
    );
    stream.pos += n;
    n
}

unsafe extern "C" fn mem_skip(nb_bytes: i64, user: *mut c_void) -> i64 {
    let stream = &mut *(user as *mut MemStream<'_>);
    if nb_bytes < 0 {
        return -1;
    }
    let n = (nb_bytes as usize).min(stream.data.len() - stream.pos.min(stream.data.len()));
    stream.pos += n;
    n as i64
}

unsafe extern "C" fn mem_seek(pos: i64, user: *mut c_void) -> i32 {
    let stream = &mut *(user as *mut MemStream<'_>);
    if pos < 0 || pos as usize > stream.data.len() {
        return 0;
    }
    stream.pos = pos as usize;
    1
}

/// Decode a J2K codestream into its single integer component.
///
/// Fails when OpenJPEG rejects the stream or the image does not carry
/// exactly one component.
pub fn decode_codestream(data: &[u8]) -> Grib2Result<DecodedImage> {
    use openjpeg_sys as opj;

    if data.is_empty() {
        return Err(Grib2Error::UnpackingError("empty codestream".into()));
    }
    let mut mem = MemStream { data, pos: 0 };
    unsafe {
        let codec = opj::opj_create_decompress(opj::CODEC_FORMAT::OPJ_CODEC_J2K);
        if codec.is_null() {
            return Err(Grib2Error::UnpackingError(
                "cannot create JPEG-2000 decoder".into(),
            ));
        }
        let mut params = std::mem::zeroed::<opj::opj_dparameters_t>();
        opj::opj_set_default_decoder_parameters(&mut params);
        if opj::opj_setup_decoder(codec, &mut params) == 0 {
            opj::opj_destroy_codec(codec);
            return Err(Grib2Error::UnpackingError(
                "cannot set up JPEG-2000 decoder".into(),
            ));
        }
        let stream = opj::opj_stream_default_create(1);
        if stream.is_null() {
            opj::opj_destroy_codec(codec);
            return Err(Grib2Error::UnpackingError(
                "cannot create JPEG-2000 stream".into(),
            ));
        }
        opj::opj_stream_set_read_function(stream, Some(mem_read));
        opj::opj_stream_set_skip_function(stream, Some(mem_skip));
        opj::opj_stream_set_seek_function(stream, Some(mem_seek));
        opj::opj_stream_set_user_data(stream, &mut mem as *mut MemStream<'_> as *mut c_void, None);
        opj::opj_stream_set_user_data_length(stream, data.len() as u64);

        let mut image: *mut opj::opj_image_t = std::ptr::null_mut();
        let ok = opj::opj_read_header(stream, codec, &mut image) != 0
            && opj::opj_decode(codec, stream, image) != 0;
        let result = if !ok || image.is_null() {
            Err(Grib2Error::UnpackingError(
                "JPEG-2000 decode failed".into(),
            ))
        } else if (*image).numcomps != 1 {
            Err(Grib2Error::UnpackingError(format!(
                "expected 1 JPEG-2000 component, got {}",
                (*image).numcomps
            )))
        } else {
            let comp = &*(*image).comps;
            let len = comp.w as usize * comp.h as usize;
            if len == 0 || comp.data.is_null() {
                Err(Grib2Error::UnpackingError(
                    "JPEG-2000 component has no pixels".into(),
                ))
            } else {
                Ok(DecodedImage {
                    width: comp.w,
                    height: comp.h,
                    samples: std::slice::from_raw_parts(comp.data, len).to_vec(),
                })
            }
        };
        if !image.is_null() {
            opj::opj_image_destroy(image);
        }
        opj::opj_stream_destroy(stream);
        opj::opj_destroy_codec(codec);
        result
    }
}

/// Spread decoded samples onto the grid and apply the linear scaling.
///
/// With a bitmap, absent cells stay `NaN` and each present cell consumes the
/// next sample; without one the samples map one to one.
pub fn scale_jpeg2000(
    samples: &[i32],
    bitmap: Option<&[u8]>,
    cell_count: usize,
    params: &Jpeg2000Params,
) -> Vec<f32> {
    let mut data = vec![f32::NAN; cell_count];
    match bitmap {
        Some(bm) => {
            let mut next = 0usize;
            for (i, cell) in data.iter_mut().enumerate() {
                if !bitmap_present(bm, i) {
                    continue;
                }
                if next >= samples.len() {
                    break;
                }
                *cell = params.scale.apply(samples[next] as f64);
                next += 1;
            }
        }
        None => {
            for (cell, s) in data.iter_mut().zip(samples.iter()) {
                *cell = params.scale.apply(*s as f64);
            }
        }
    }
    data
}
