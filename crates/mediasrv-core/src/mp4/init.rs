//! Parses the `ftyp`+`moov` initialization segment of a fragmented MP4
//! file: per-track timescale/codec/duration and the segment-info
//! extension box used to recognize concatenable outputs (spec.md §4.B
//! "Header reader").

use std::io::Cursor;

use super::boxes::{find_all_boxes, find_box, read_u32, read_u64, read_u8, skip, BoxReader};
use crate::error::{MuxError, Result};

/// Stream identity carried in a private extension box under `moov/udta`
/// so that segments produced by the same live session can be recognized
/// as consecutive even when their wall-clock boundary drifts outside
/// the concatenation tolerance (spec.md §4.B "concatenation tolerance
/// ... or the stream-identifier/segment-counter is consecutive").
///
/// This extension box (fourcc `mss1`) is this muxer's own addition —
/// no standard ISO-BMFF box carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub stream_id: u64,
    pub segment_counter: u64,
}

const SEGMENT_INFO_BOX: &[u8; 4] = b"mss1";

impl SegmentInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(&self.stream_id.to_be_bytes());
        body.extend_from_slice(&self.segment_counter.to_be_bytes());
        super::boxes::BoxWriter::wrap_box(SEGMENT_INFO_BOX, body)
    }

    fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 16 {
            return None;
        }
        Some(Self {
            stream_id: u64::from_be_bytes(payload[0..8].try_into().ok()?),
            segment_counter: u64::from_be_bytes(payload[8..16].try_into().ok()?),
        })
    }

    /// True when `next` is the segment that should immediately follow
    /// `self` in playback order.
    pub fn is_consecutive_with(&self, next: &SegmentInfo) -> bool {
        self.stream_id == next.stream_id && next.segment_counter == self.segment_counter + 1
    }
}

#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub id: u32,
    pub timescale: u32,
    /// Raw `stsd` payload bytes, used only for structural-compatibility
    /// comparison; this muxer never decodes codec parameters.
    pub codec_descriptor: Vec<u8>,
    /// Duration in track units, from `mdhd` if nonzero there, else
    /// derived later by scanning fragments (spec.md §4.B).
    pub duration: u64,
}

#[derive(Debug, Clone)]
pub struct SegmentInit {
    pub ftyp: Vec<u8>,
    pub moov: Vec<u8>,
    pub tracks: Vec<TrackInfo>,
    pub segment_info: Option<SegmentInfo>,
}

impl SegmentInit {
    /// Parses the leading `ftyp`+`moov` pair out of a file buffer,
    /// returning the initialization plus the byte offset where the
    /// first `moof` begins.
    pub fn parse(data: &[u8]) -> Result<(SegmentInit, u64)> {
        let mut reader = BoxReader::new(data);
        let mut ftyp = None;
        let mut moov = None;
        let mut moov_header = None;
        let mut offset_after_header = 0u64;

        while let Some(header) = reader.next()? {
            match header.type_str() {
                "ftyp" => ftyp = Some(data[header.payload_start as usize - 8..header.payload_end as usize].to_vec()),
                "moov" => {
                    moov = Some(data[header.payload_start as usize - 8..header.payload_end as usize].to_vec());
                    moov_header = Some(header);
                }
                "moof" => {
                    offset_after_header = header.payload_start - 8;
                    break;
                }
                _ => {}
            }
        }

        let ftyp = ftyp.ok_or(MuxError::MissingBox("ftyp"))?;
        let moov_bytes = moov.ok_or(MuxError::MissingBox("moov"))?;
        let moov_header = moov_header.expect("moov present implies header captured");
        let moov_payload = &data[moov_header.payload_start as usize..moov_header.payload_end as usize];

        let tracks = parse_tracks(moov_payload)?;
        let segment_info = find_box(moov_payload, b"udta")?
            .and_then(|(udta, _)| find_box(udta, SEGMENT_INFO_BOX).ok().flatten())
            .and_then(|(payload, _)| SegmentInfo::parse(payload));

        Ok((
            SegmentInit {
                ftyp,
                moov: moov_bytes,
                tracks,
                segment_info,
            },
            offset_after_header,
        ))
    }

    /// Two initializations are structurally compatible when they carry
    /// the same tracks, in the same order, with matching timescale and
    /// codec descriptor (spec.md §4.B "initializations match structurally").
    pub fn structurally_compatible(&self, other: &SegmentInit) -> bool {
        if self.tracks.len() != other.tracks.len() {
            return false;
        }
        self.tracks.iter().zip(&other.tracks).all(|(a, b)| {
            a.id == b.id && a.timescale == b.timescale && a.codec_descriptor == b.codec_descriptor
        })
    }
}

fn parse_tracks(moov_payload: &[u8]) -> Result<Vec<TrackInfo>> {
    let mut tracks = Vec::new();
    for (trak_payload, _) in find_all_boxes(moov_payload, b"trak")? {
        if let Some(track) = parse_track(trak_payload)? {
            tracks.push(track);
        }
    }
    Ok(tracks)
}

fn parse_track(trak_payload: &[u8]) -> Result<Option<TrackInfo>> {
    let Some((tkhd, _)) = find_box(trak_payload, b"tkhd")? else {
        return Ok(None);
    };
    let id = parse_tkhd_track_id(tkhd)?;

    let Some((mdia, _)) = find_box(trak_payload, b"mdia")? else {
        return Ok(None);
    };
    let Some((mdhd, _)) = find_box(mdia, b"mdhd")? else {
        return Ok(None);
    };
    let (timescale, duration) = parse_mdhd(mdhd)?;

    let codec_descriptor = parse_codec_descriptor(mdia)?.unwrap_or_default();

    Ok(Some(TrackInfo {
        id,
        timescale,
        codec_descriptor,
        duration,
    }))
}

fn parse_codec_descriptor(mdia: &[u8]) -> Result<Option<Vec<u8>>> {
    let Some((minf, _)) = find_box(mdia, b"minf")? else {
        return Ok(None);
    };
    let Some((stbl, _)) = find_box(minf, b"stbl")? else {
        return Ok(None);
    };
    let Some((stsd, _)) = find_box(stbl, b"stsd")? else {
        return Ok(None);
    };
    Ok(Some(stsd.to_vec()))
}

fn parse_tkhd_track_id(payload: &[u8]) -> Result<u32> {
    let mut cursor = Cursor::new(payload);
    let version = read_u8(&mut cursor)?;
    skip(&mut cursor, 3)?; // flags
    if version == 1 {
        skip(&mut cursor, 8 + 8)?; // creation + modification time (64-bit)
    } else {
        skip(&mut cursor, 4 + 4)?;
    }
    read_u32(&mut cursor)
}

fn parse_mdhd(payload: &[u8]) -> Result<(u32, u64)> {
    let mut cursor = Cursor::new(payload);
    let version = read_u8(&mut cursor)?;
    skip(&mut cursor, 3)?;
    let (timescale, duration) = if version == 1 {
        skip(&mut cursor, 16)?; // creation + modification time
        let timescale = read_u32(&mut cursor)?;
        let duration = read_u64(&mut cursor)?;
        (timescale, duration)
    } else {
        skip(&mut cursor, 8)?;
        let timescale = read_u32(&mut cursor)?;
        let duration = read_u32(&mut cursor)? as u64;
        (timescale, duration)
    };
    Ok((timescale, duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::boxes::BoxWriter;

    fn mdhd(timescale: u32, duration: u32) -> Vec<u8> {
        let mut body = vec![0u8, 0, 0, 0]; // version 0 + flags
        body.extend_from_slice(&[0; 8]); // creation + modification
        body.extend_from_slice(&timescale.to_be_bytes());
        body.extend_from_slice(&duration.to_be_bytes());
        body.extend_from_slice(&[0; 4]); // language + pre_defined
        BoxWriter::wrap_box(b"mdhd", body)
    }

    fn tkhd(id: u32) -> Vec<u8> {
        let mut body = vec![0u8, 0, 0, 0];
        body.extend_from_slice(&[0; 8]);
        body.extend_from_slice(&id.to_be_bytes());
        BoxWriter::wrap_box(b"tkhd", body)
    }

    fn stsd() -> Vec<u8> {
        BoxWriter::wrap_box(b"stsd", vec![1, 2, 3, 4])
    }

    fn trak(id: u32, timescale: u32, duration: u32) -> Vec<u8> {
        let stbl = BoxWriter::wrap_box(b"stbl", stsd());
        let minf = BoxWriter::wrap_box(b"minf", stbl);
        let mdia_body = [mdhd(timescale, duration), minf].concat();
        let mdia = BoxWriter::wrap_box(b"mdia", mdia_body);
        let trak_body = [tkhd(id), mdia].concat();
        BoxWriter::wrap_box(b"trak", trak_body)
    }

    #[test]
    fn parses_tracks_from_moov() {
        let moov_body = [trak(1, 90000, 0), trak(2, 48000, 0)].concat();
        let moov = BoxWriter::wrap_box(b"moov", moov_body);
        let ftyp = BoxWriter::wrap_box(b"ftyp", vec![b'i', b's', b'o', b'm']);
        let moof_placeholder = BoxWriter::wrap_box(b"moof", vec![0]);
        let data = [ftyp, moov, moof_placeholder].concat();

        let (init, offset) = SegmentInit::parse(&data).unwrap();
        assert_eq!(init.tracks.len(), 2);
        assert_eq!(init.tracks[0].id, 1);
        assert_eq!(init.tracks[0].timescale, 90000);
        assert_eq!(init.tracks[1].timescale, 48000);
        assert_eq!(offset, data.len() as u64 - 9);
    }

    #[test]
    fn structural_compatibility_requires_matching_tracks() {
        let moov_a = BoxWriter::wrap_box(b"moov", trak(1, 90000, 0));
        let moov_b = BoxWriter::wrap_box(b"moov", trak(1, 48000, 0));
        let ftyp = BoxWriter::wrap_box(b"ftyp", vec![1]);
        let moof = BoxWriter::wrap_box(b"moof", vec![0]);

        let a = SegmentInit::parse(&[ftyp.clone(), moov_a, moof.clone()].concat())
            .unwrap()
            .0;
        let b = SegmentInit::parse(&[ftyp, moov_b, moof].concat()).unwrap().0;
        assert!(!a.structurally_compatible(&b));
    }

    #[test]
    fn segment_info_round_trips() {
        let info = SegmentInfo {
            stream_id: 42,
            segment_counter: 7,
        };
        let encoded = info.encode();
        let (payload, _) = find_box(&encoded, SEGMENT_INFO_BOX).unwrap().unwrap();
        assert_eq!(SegmentInfo::parse(payload).unwrap(), info);
    }
}
