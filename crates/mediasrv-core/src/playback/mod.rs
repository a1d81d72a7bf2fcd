//! Playback Engine: `list` and `get` over the Record Segment Index and
//! the fMP4 re-muxer (spec.md §4.C).

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::config::RecordFormat;
use crate::error::{MuxError, RecordError, Result};
use crate::mp4::{cut_segment, FragmentedMp4Muxer, PlainMp4Muxer, SegmentInit};
use crate::record::{find_segments, find_segments_in_timespan, RecordSegment};

const CONCATENATION_TOLERANCE: Duration = Duration::from_secs(1);

struct OpenSegment {
    data: Vec<u8>,
    init: SegmentInit,
    moof_offset: u64,
    duration: Duration,
}

fn open_segment(segment: &RecordSegment) -> Result<OpenSegment> {
    let data = std::fs::read(&segment.path).map_err(RecordError::Io)?;
    let (init, moof_offset) = SegmentInit::parse(&data)?;

    let declared_secs = init
        .tracks
        .iter()
        .filter(|t| t.timescale > 0)
        .map(|t| t.duration as f64 / t.timescale as f64)
        .fold(0.0_f64, f64::max);

    let duration = if declared_secs > 0.0 {
        Duration::from_secs_f64(declared_secs)
    } else {
        scan_duration(&data, &init, moof_offset)?
    };

    Ok(OpenSegment {
        data,
        init,
        moof_offset,
        duration,
    })
}

/// Falls back to walking every part when `mvhd`/`mdhd` duration is zero
/// (spec.md §4.B "Header reader").
fn scan_duration(data: &[u8], init: &SegmentInit, moof_offset: u64) -> Result<Duration> {
    let cut = cut_segment(data, init, moof_offset, Duration::ZERO, None, &BTreeMap::new(), false)?;
    let secs = cut
        .tracks
        .iter()
        .filter(|t| t.timescale > 0 && !t.samples.is_empty())
        .map(|t| {
            let last = t.samples.last().unwrap();
            (last.dts + last.duration as i64) as f64 / t.timescale as f64
        })
        .fold(0.0_f64, f64::max);
    Ok(Duration::from_secs_f64(secs.max(0.0)))
}

fn concatenable(prev: &OpenSegment, prev_start: DateTime<Local>, next: &SegmentInit, next_start: DateTime<Local>) -> bool {
    if !prev.init.structurally_compatible(next) {
        return false;
    }
    let prev_end = prev_start + chrono::Duration::from_std(prev.duration).unwrap_or_default();
    let gap = (next_start - prev_end).num_milliseconds().unsigned_abs();
    if gap <= CONCATENATION_TOLERANCE.as_millis() as u64 {
        return true;
    }
    match (prev.init.segment_info, next.segment_info) {
        (Some(a), Some(b)) => a.is_consecutive_with(&b),
        _ => false,
    }
}

/// One playable span returned by [`list`] (spec.md §4.C).
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub start: DateTime<Local>,
    pub duration: Duration,
    pub url: String,
}

fn build_url(path_name: &str, start: DateTime<Local>, duration: Duration, format: RecordFormat) -> String {
    let format_str = match format {
        RecordFormat::Fmp4 => "fmp4",
        RecordFormat::Mp4 => "mp4",
    };
    format!(
        "/get?path={path_name}&start={}&duration={:.3}&format={format_str}",
        start.to_rfc3339(),
        duration.as_secs_f64()
    )
}

/// `list(path, [start, end])` (spec.md §4.C).
pub fn list(
    template: &str,
    path_name: &str,
    start: Option<DateTime<Local>>,
    end: Option<DateTime<Local>>,
) -> Result<Vec<ListEntry>> {
    let segments = find_segments(template, path_name, start, end)?;

    let mut entries: Vec<(DateTime<Local>, Duration)> = Vec::new();
    let mut prev_open: Option<(OpenSegment, DateTime<Local>)> = None;

    for segment in &segments {
        let opened = open_segment(segment)?;
        let extend = match (&entries.last(), &prev_open) {
            (Some(_), Some((prev, prev_start))) => {
                concatenable(prev, *prev_start, &opened.init, segment.start)
            }
            _ => false,
        };

        if extend {
            let last = entries.last_mut().expect("extend implies a prior entry");
            last.1 = (segment.start + chrono::Duration::from_std(opened.duration).unwrap_or_default() - last.0)
                .to_std()
                .unwrap_or(last.1);
        } else {
            entries.push((segment.start, opened.duration));
        }
        prev_open = Some((opened, segment.start));
    }

    if entries.is_empty() {
        return Err(RecordError::NoSegmentsFound(path_name.to_string()).into());
    }

    if let Some(start) = start {
        let first = entries[0];
        let first_end = first.0 + chrono::Duration::from_std(first.1).unwrap_or_default();
        if first_end < start {
            entries.remove(0);
        } else if let Some(first) = entries.first_mut() {
            if start > first.0 {
                let trimmed = (first_end - start).to_std().unwrap_or_default();
                first.0 = start;
                first.1 = trimmed;
            }
        }
    }

    if let Some(end) = end {
        if let Some(last) = entries.last_mut() {
            let last_end = last.0 + chrono::Duration::from_std(last.1).unwrap_or_default();
            if last_end > end {
                last.1 = (end - last.0).to_std().unwrap_or_default();
            }
        }
    }

    Ok(entries
        .into_iter()
        .map(|(start, duration)| ListEntry {
            start,
            duration,
            url: build_url(path_name, start, duration, RecordFormat::Fmp4),
        })
        .collect())
}

/// `get(path, start, duration, format)` (spec.md §4.C). Buffers the
/// whole response; the HTTP layer is responsible for streaming it out
/// in chunks as they become available.
pub fn get(
    template: &str,
    path_name: &str,
    start: DateTime<Local>,
    duration: Duration,
    format: RecordFormat,
) -> Result<Vec<u8>> {
    let segments = find_segments_in_timespan(template, path_name, start, duration)?;
    let mut iter = segments.iter();
    let first = iter.next().expect("find_segments_in_timespan returns non-empty");

    let first_open = open_segment(first)?;
    let elapsed = (start - first.start).to_std().unwrap_or(Duration::ZERO);

    let mut remaining = duration;
    let mut cut = cut_segment(
        &first_open.data,
        &first_open.init,
        first_open.moof_offset,
        elapsed,
        Some(remaining),
        &BTreeMap::new(),
        true,
    )?;

    let mut frag_muxer = FragmentedMp4Muxer::new();
    let mut plain_muxer = PlainMp4Muxer::new();
    let mut out = Vec::new();

    match format {
        RecordFormat::Fmp4 => {
            out.extend(frag_muxer.write_init(&first_open.init.ftyp, &first_open.init.moov));
            out.extend(frag_muxer.write_fragment(&cut));
        }
        RecordFormat::Mp4 => {
            plain_muxer.push(&cut);
        }
    }

    let mut prev_open = first_open;
    let mut prev_start = first.start;
    let mut bias: BTreeMap<u32, i64> = track_end_bias(&cut);

    for segment in iter {
        remaining = subtract_consumed(remaining, &cut);
        if cut.reached_requested_end || remaining.is_zero() {
            break;
        }

        let next_open = open_segment(segment)?;
        if !concatenable(&prev_open, prev_start, &next_open.init, segment.start) {
            break;
        }

        cut = cut_segment(
            &next_open.data,
            &next_open.init,
            next_open.moof_offset,
            Duration::ZERO,
            Some(remaining),
            &bias,
            false,
        )?;

        match format {
            RecordFormat::Fmp4 => out.extend(frag_muxer.write_fragment(&cut)),
            RecordFormat::Mp4 => plain_muxer.push(&cut),
        }

        bias = track_end_bias(&cut);
        prev_open = next_open;
        prev_start = segment.start;
    }

    if matches!(format, RecordFormat::Mp4) {
        out = plain_muxer.finalize(&prev_open.init.ftyp);
    }

    if out.is_empty() {
        return Err(MuxError::NoSyncSample.into());
    }

    Ok(out)
}

fn track_end_bias(cut: &crate::mp4::CutOutput) -> BTreeMap<u32, i64> {
    cut.tracks
        .iter()
        .filter_map(|t| t.samples.last().map(|s| (t.track_id, s.dts + s.duration as i64)))
        .collect()
}

fn subtract_consumed(remaining: Duration, cut: &crate::mp4::CutOutput) -> Duration {
    let consumed_secs = cut
        .tracks
        .iter()
        .filter(|t| t.timescale > 0 && !t.samples.is_empty())
        .map(|t| {
            let last = t.samples.last().unwrap();
            (last.dts + last.duration as i64) as f64 / t.timescale as f64
        })
        .fold(0.0_f64, f64::max);
    remaining.saturating_sub(Duration::from_secs_f64(consumed_secs.max(0.0)))
}
