//! Sample record and `tfhd`/`tfdt`/`trun` parsing (spec.md §4.B).

use std::io::Cursor;

use super::boxes::{read_u32, read_u64, read_u8, skip, BoxReader};
use crate::error::{MuxError, Result};

/// `(duration, pts-offset, is-non-sync, payload)` per spec.md §4.B.
/// `payload` is filled in lazily by reading the referenced byte range
/// from the segment file (random access), not eagerly during the walk.
#[derive(Debug, Clone)]
pub struct Sample {
    pub track_id: u32,
    pub dts: i64,
    pub duration: u32,
    pub pts_offset: i32,
    pub is_sync: bool,
    pub file_offset: u64,
    pub size: u32,
}

const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;
const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x00_0008;
const TFHD_DEFAULT_SAMPLE_SIZE: u32 = 0x00_0010;
const TFHD_DEFAULT_SAMPLE_FLAGS: u32 = 0x00_0020;
const TFHD_BASE_DATA_OFFSET: u32 = 0x00_0001;

const TRUN_DATA_OFFSET: u32 = 0x00_0001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x00_0004;
const TRUN_SAMPLE_DURATION: u32 = 0x00_0100;
const TRUN_SAMPLE_SIZE: u32 = 0x00_0200;
const TRUN_SAMPLE_FLAGS: u32 = 0x00_0400;
const TRUN_SAMPLE_CTS: u32 = 0x00_0800;

const SAMPLE_DEPENDS_ON_OTHERS: u32 = 0x0101_0000;

/// Parsed `tfhd`: identifies the track and supplies this fragment's
/// per-sample defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackFragmentHeader {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

pub fn parse_tfhd(payload: &[u8]) -> Result<TrackFragmentHeader> {
    let mut cursor = Cursor::new(payload);
    skip(&mut cursor, 1)?; // version
    let mut flag_bytes = [0u8; 3];
    std::io::Read::read_exact(&mut cursor, &mut flag_bytes)
        .map_err(|e| MuxError::MalformedBox(e.to_string()))?;
    let flags = u32::from_be_bytes([0, flag_bytes[0], flag_bytes[1], flag_bytes[2]]);

    let track_id = read_u32(&mut cursor)?;
    let mut out = TrackFragmentHeader {
        track_id,
        ..Default::default()
    };

    if flags & TFHD_BASE_DATA_OFFSET != 0 {
        out.base_data_offset = Some(read_u64(&mut cursor)?);
    }
    if flags & 0x00_0002 != 0 {
        skip(&mut cursor, 4)?; // sample_description_index
    }
    if flags & TFHD_DEFAULT_SAMPLE_DURATION != 0 {
        out.default_sample_duration = read_u32(&mut cursor)?;
    }
    if flags & TFHD_DEFAULT_SAMPLE_SIZE != 0 {
        out.default_sample_size = read_u32(&mut cursor)?;
    }
    if flags & TFHD_DEFAULT_SAMPLE_FLAGS != 0 {
        out.default_sample_flags = read_u32(&mut cursor)?;
    }
    let _ = TFHD_DEFAULT_BASE_IS_MOOF; // base-is-moof does not change offset math here
    Ok(out)
}

/// Parsed `tfdt`: baseline DTS for the following `trun`(s), in track units.
pub fn parse_tfdt(payload: &[u8]) -> Result<i64> {
    let mut cursor = Cursor::new(payload);
    let version = read_u8(&mut cursor)?;
    skip(&mut cursor, 3)?;
    if version == 1 {
        Ok(read_u64(&mut cursor)? as i64)
    } else {
        Ok(read_u32(&mut cursor)? as i64)
    }
}

/// Walks one `trun` box, yielding samples with DTS computed relative to
/// `baseline_dts` and file offsets resolved against `mdat_payload_start`
/// (the start of the sibling `mdat`'s payload).
#[allow(clippy::too_many_arguments)]
pub fn parse_trun(
    payload: &[u8],
    tfhd: &TrackFragmentHeader,
    baseline_dts: i64,
    moof_start: u64,
    mdat_payload_start: u64,
) -> Result<Vec<Sample>> {
    let mut cursor = Cursor::new(payload);
    skip(&mut cursor, 1)?; // version
    let mut flag_bytes = [0u8; 3];
    std::io::Read::read_exact(&mut cursor, &mut flag_bytes)
        .map_err(|e| MuxError::MalformedBox(e.to_string()))?;
    let flags = u32::from_be_bytes([0, flag_bytes[0], flag_bytes[1], flag_bytes[2]]);

    let sample_count = read_u32(&mut cursor)?;
    let mut data_offset = tfhd.base_data_offset.unwrap_or(moof_start) as i64;
    if flags & TRUN_DATA_OFFSET != 0 {
        data_offset += {
            let mut b = [0u8; 4];
            std::io::Read::read_exact(&mut cursor, &mut b)
                .map_err(|e| MuxError::MalformedBox(e.to_string()))?;
            i32::from_be_bytes(b) as i64
        };
    } else {
        data_offset = mdat_payload_start as i64;
    }

    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        skip(&mut cursor, 4)?;
    }

    let mut samples = Vec::with_capacity(sample_count as usize);
    let mut dts = baseline_dts;
    let mut file_offset = data_offset as u64;

    for _ in 0..sample_count {
        let duration = if flags & TRUN_SAMPLE_DURATION != 0 {
            read_u32(&mut cursor)?
        } else {
            tfhd.default_sample_duration
        };
        let size = if flags & TRUN_SAMPLE_SIZE != 0 {
            read_u32(&mut cursor)?
        } else {
            tfhd.default_sample_size
        };
        let sample_flags = if flags & TRUN_SAMPLE_FLAGS != 0 {
            read_u32(&mut cursor)?
        } else {
            tfhd.default_sample_flags
        };
        let cts = if flags & TRUN_SAMPLE_CTS != 0 {
            let mut b = [0u8; 4];
            std::io::Read::read_exact(&mut cursor, &mut b)
                .map_err(|e| MuxError::MalformedBox(e.to_string()))?;
            i32::from_be_bytes(b)
        } else {
            0
        };

        let is_sync = sample_flags & SAMPLE_DEPENDS_ON_OTHERS == 0;

        samples.push(Sample {
            track_id: tfhd.track_id,
            dts,
            duration,
            pts_offset: cts,
            is_sync,
            file_offset,
            size,
        });

        dts += duration as i64;
        file_offset += size as u64;
    }

    Ok(samples)
}

/// Locates the `mdat` box immediately following a `moof` and returns
/// the start of its payload, used to resolve `trun` data offsets that
/// default to "first byte of the next mdat" (no `data-offset` flag).
pub fn find_sibling_mdat_payload_start(data: &[u8], after: u64) -> Result<Option<u64>> {
    let mut reader = BoxReader::slice(data, after, data.len() as u64);
    while let Some(header) = reader.next()? {
        if header.is(b"mdat") {
            return Ok(Some(header.payload_start));
        }
        if header.is(b"moof") {
            return Ok(None);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::boxes::{find_box, BoxWriter};

    fn build_tfhd(track_id: u32, default_duration: u32) -> Vec<u8> {
        let mut body = vec![0u8, 0, 0, 0x08]; // version 0, flags = default-sample-duration-present
        body.extend_from_slice(&track_id.to_be_bytes());
        body.extend_from_slice(&default_duration.to_be_bytes());
        BoxWriter::wrap_box(b"tfhd", body)
    }

    fn build_tfdt(baseline: u32) -> Vec<u8> {
        let mut body = vec![0u8, 0, 0, 0];
        body.extend_from_slice(&baseline.to_be_bytes());
        BoxWriter::wrap_box(b"tfdt", body)
    }

    #[test]
    fn parses_tfhd_fields() {
        let buf = build_tfhd(5, 3000);
        let (payload, _) = find_box(&buf, b"tfhd").unwrap().unwrap();
        let tfhd = parse_tfhd(payload).unwrap();
        assert_eq!(tfhd.track_id, 5);
        assert_eq!(tfhd.default_sample_duration, 3000);
    }

    #[test]
    fn parses_tfdt_baseline() {
        let buf = build_tfdt(9000);
        let (payload, _) = find_box(&buf, b"tfdt").unwrap().unwrap();
        assert_eq!(parse_tfdt(payload).unwrap(), 9000);
    }

    #[test]
    fn parses_trun_with_explicit_durations_and_flags() {
        let tfhd = TrackFragmentHeader {
            track_id: 1,
            base_data_offset: Some(0),
            default_sample_duration: 0,
            default_sample_size: 0,
            default_sample_flags: SAMPLE_DEPENDS_ON_OTHERS,
        };
        let mut body = Vec::new();
        body.push(0); // version
        body.extend_from_slice(&[0x00, 0x07, 0x01]); // flags: data-offset | duration | size | flags
        body.extend_from_slice(&2u32.to_be_bytes()); // sample count
        body.extend_from_slice(&100i32.to_be_bytes()); // data offset
        // sample 1: sync
        body.extend_from_slice(&3000u32.to_be_bytes());
        body.extend_from_slice(&500u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        // sample 2: non-sync
        body.extend_from_slice(&3000u32.to_be_bytes());
        body.extend_from_slice(&600u32.to_be_bytes());
        body.extend_from_slice(&SAMPLE_DEPENDS_ON_OTHERS.to_be_bytes());
        let trun = BoxWriter::wrap_box(b"trun", body);

        let (payload, _) = find_box(&trun, b"trun").unwrap().unwrap();
        let samples = parse_trun(payload, &tfhd, 0, 0, 0).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples[0].is_sync);
        assert!(!samples[1].is_sync);
        assert_eq!(samples[1].dts, 3000);
        assert_eq!(samples[0].file_offset, 100);
        assert_eq!(samples[1].file_offset, 600);
    }
}
