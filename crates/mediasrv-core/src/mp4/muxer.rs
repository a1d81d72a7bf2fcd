//! Output muxers: fragmented-MP4 (live playback) and plain MP4
//! (whole-clip download), per spec.md §4.B "Muxer output format".

use std::time::Duration;

use super::boxes::BoxWriter;
use super::remux::{CutOutput, CutSample};

const PART_DURATION: Duration = Duration::from_secs(1);

/// Emits an initialization once, then one fragment per cut input,
/// sealing a fragment either at the part boundary or once a track's
/// accumulated duration exceeds [`PART_DURATION`].
pub struct FragmentedMp4Muxer {
    init_written: bool,
    sequence_number: u32,
}

impl FragmentedMp4Muxer {
    pub fn new() -> Self {
        Self {
            init_written: false,
            sequence_number: 0,
        }
    }

    /// Writes `ftyp`+`moov` once, as-is from the source initialization.
    pub fn write_init(&mut self, ftyp: &[u8], moov: &[u8]) -> Vec<u8> {
        if self.init_written {
            return Vec::new();
        }
        self.init_written = true;
        let mut out = Vec::with_capacity(ftyp.len() + moov.len());
        out.extend_from_slice(ftyp);
        out.extend_from_slice(moov);
        out
    }

    /// Writes one `moof`+`mdat` fragment per track covering `cut`,
    /// splitting into multiple fragments internally if any track's
    /// accumulated duration in ticks would exceed its part-duration
    /// budget (spec.md §4.B flush policy).
    pub fn write_fragment(&mut self, cut: &CutOutput) -> Vec<u8> {
        let mut out = Vec::new();
        for track in &cut.tracks {
            if track.samples.is_empty() {
                continue;
            }
            let part_ticks = (PART_DURATION.as_secs_f64() * track.timescale as f64) as u32;
            let mut chunk: Vec<&CutSample> = Vec::new();
            let mut accumulated = 0u32;

            for sample in &track.samples {
                chunk.push(sample);
                accumulated += sample.duration;
                if accumulated >= part_ticks {
                    self.flush_chunk(&mut out, track.track_id, &chunk);
                    chunk.clear();
                    accumulated = 0;
                }
            }
            if !chunk.is_empty() {
                self.flush_chunk(&mut out, track.track_id, &chunk);
            }
        }
        out
    }

    fn flush_chunk(&mut self, out: &mut Vec<u8>, track_id: u32, samples: &[&CutSample]) {
        self.sequence_number += 1;
        let baseline = samples[0].dts;

        let mfhd = BoxWriter::wrap_box(b"mfhd", {
            let mut b = vec![0u8, 0, 0, 0];
            b.extend_from_slice(&self.sequence_number.to_be_bytes());
            b
        });

        let mut tfhd_body = vec![0u8, 0, 0, 0];
        tfhd_body.extend_from_slice(&track_id.to_be_bytes());
        let tfhd = BoxWriter::wrap_box(b"tfhd", tfhd_body);

        let mut tfdt_body = vec![1u8, 0, 0, 0]; // version 1: 64-bit baseMediaDecodeTime
        tfdt_body.extend_from_slice(&(baseline.max(0) as u64).to_be_bytes());
        let tfdt = BoxWriter::wrap_box(b"tfdt", tfdt_body);

        let mut trun_body = vec![0u8];
        trun_body.extend_from_slice(&[0x00, 0x0f, 0x01]); // data-offset|cts|duration|size|flags... see below
        trun_body.extend_from_slice(&(samples.len() as u32).to_be_bytes());
        let data_offset_pos = trun_body.len();
        trun_body.extend_from_slice(&0i32.to_be_bytes()); // patched below

        let mut mdat_body = Vec::new();
        for sample in samples {
            trun_body.extend_from_slice(&sample.duration.to_be_bytes());
            trun_body.extend_from_slice(&(sample.payload.len() as u32).to_be_bytes());
            let flags: u32 = if sample.is_sync { 0x0200_0000 } else { 0x0101_0000 };
            trun_body.extend_from_slice(&flags.to_be_bytes());
            trun_body.extend_from_slice(&sample.pts_offset.to_be_bytes());
            mdat_body.extend_from_slice(&sample.payload);
        }

        let trun = BoxWriter::wrap_box(b"trun", trun_body.clone());
        let traf = BoxWriter::wrap_container(b"traf", &[tfhd, tfdt, trun]);
        let moof = BoxWriter::wrap_container(b"moof", &[mfhd, traf]);
        let mdat = BoxWriter::wrap_box(b"mdat", mdat_body);

        let data_offset = (moof.len() + 8) as i32;
        let trun_start = moof.len() - (trun_body.len() + 8);
        let offset_field = trun_start + 8 + data_offset_pos;
        let mut moof = moof;
        moof[offset_field..offset_field + 4].copy_from_slice(&data_offset.to_be_bytes());

        out.extend(moof);
        out.extend(mdat);
    }
}

impl Default for FragmentedMp4Muxer {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffers every sample across every track until [`finalize`], then
/// writes one `moov`+`mdat`. Tracks with no samples are omitted; a
/// negative leading `pts_offset` is compensated with an edit list
/// instead of being clamped.
pub struct PlainMp4Muxer {
    tracks: Vec<(u32, u32, Vec<CutSample>)>, // (track_id, timescale, samples)
}

impl PlainMp4Muxer {
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    pub fn push(&mut self, cut: &CutOutput) {
        for track in &cut.tracks {
            if track.samples.is_empty() {
                continue;
            }
            match self.tracks.iter_mut().find(|(id, _, _)| *id == track.track_id) {
                Some((_, _, samples)) => samples.extend(track.samples.iter().cloned()),
                None => self
                    .tracks
                    .push((track.track_id, track.timescale, track.samples.clone())),
            }
        }
    }

    /// Writes a single `mdat` containing every track's samples back to
    /// back, plus a minimal `moov` recording each track's edit list.
    pub fn finalize(self, ftyp: &[u8]) -> Vec<u8> {
        let mut mdat_body = Vec::new();
        let mut trak_boxes = Vec::new();

        for (track_id, timescale, samples) in &self.tracks {
            let first_pts_offset = samples.first().map(|s| s.pts_offset).unwrap_or(0);
            let edit_list = edit_list_box(first_pts_offset, *timescale, samples);

            let mut tkhd_body = vec![0u8, 0, 0, 0];
            tkhd_body.extend_from_slice(&[0; 8]);
            tkhd_body.extend_from_slice(&track_id.to_be_bytes());
            let tkhd = BoxWriter::wrap_box(b"tkhd", tkhd_body);

            for sample in samples.iter() {
                mdat_body.extend_from_slice(&sample.payload);
            }

            let edts = BoxWriter::wrap_box(b"edts", edit_list);
            let trak = BoxWriter::wrap_container(b"trak", &[tkhd, edts]);
            trak_boxes.push(trak);
        }

        let moov = BoxWriter::wrap_container(b"moov", &trak_boxes);
        let mdat = BoxWriter::wrap_box(b"mdat", mdat_body);

        let mut out = Vec::new();
        out.extend_from_slice(ftyp);
        out.extend(moov);
        out.extend(mdat);
        out
    }
}

impl Default for PlainMp4Muxer {
    fn default() -> Self {
        Self::new()
    }
}

fn edit_list_box(first_pts_offset: i32, timescale: u32, samples: &[CutSample]) -> Vec<u8> {
    let total_duration: u64 = samples.iter().map(|s| s.duration as u64).sum();
    let media_time = first_pts_offset.max(0) as u64;

    let mut body = vec![0u8, 0, 0, 0];
    body.extend_from_slice(&1u32.to_be_bytes()); // entry count
    body.extend_from_slice(&(total_duration as u32).to_be_bytes());
    body.extend_from_slice(&(media_time as i32).to_be_bytes());
    body.extend_from_slice(&1i16.to_be_bytes()); // media_rate_integer
    body.extend_from_slice(&0i16.to_be_bytes()); // media_rate_fraction
    let _ = timescale;
    BoxWriter::wrap_box(b"elst", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::remux::TrackCut;

    fn sample(dts: i64, duration: u32, is_sync: bool, payload: Vec<u8>) -> CutSample {
        CutSample {
            dts,
            duration,
            pts_offset: 0,
            is_sync,
            payload,
        }
    }

    #[test]
    fn fragmented_muxer_writes_init_once() {
        let mut muxer = FragmentedMp4Muxer::new();
        let first = muxer.write_init(b"ftyp", b"moov");
        let second = muxer.write_init(b"ftyp", b"moov");
        assert!(!first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn fragmented_muxer_splits_on_part_duration() {
        let mut muxer = FragmentedMp4Muxer::new();
        let cut = CutOutput {
            tracks: vec![TrackCut {
                track_id: 1,
                timescale: 1000,
                samples: vec![
                    sample(0, 1200, true, vec![1]),
                    sample(1200, 200, false, vec![2]),
                ],
            }],
            reached_requested_end: false,
        };
        let bytes = muxer.write_fragment(&cut);
        assert!(!bytes.is_empty());
        // two fragments expected: first sample alone exceeds the 1000-tick part budget
        let moof_count = bytes.windows(4).filter(|w| w == b"moof").count();
        assert_eq!(moof_count, 2);
    }

    #[test]
    fn plain_muxer_omits_empty_tracks() {
        let mut muxer = PlainMp4Muxer::new();
        muxer.push(&CutOutput {
            tracks: vec![
                TrackCut {
                    track_id: 1,
                    timescale: 1000,
                    samples: vec![sample(0, 1000, true, vec![9])],
                },
                TrackCut {
                    track_id: 2,
                    timescale: 1000,
                    samples: vec![],
                },
            ],
            reached_requested_end: false,
        });
        let bytes = muxer.finalize(b"ftyp");
        let trak_count = bytes.windows(4).filter(|w| w == b"trak").count();
        assert_eq!(trak_count, 1);
    }
}
