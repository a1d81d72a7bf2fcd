//! Segment index operations: `findSegments`, `findSegmentsInTimespan`,
//! `findAllPathsWithSegments` (spec.md §4.A).

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};

use super::template::{self, Decoded};
use crate::error::{RecordError, Result};

/// Recursively lists regular files under `root`, skipping directories
/// that cannot be read rather than failing the whole walk.
fn walk_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if let Ok(file_type) = entry.file_type() {
            if file_type.is_dir() {
                walk_files(&path, out);
            } else if file_type.is_file() {
                out.push(path);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSegment {
    pub path: std::path::PathBuf,
    pub start: DateTime<Local>,
}

impl PartialOrd for RecordSegment {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordSegment {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start.cmp(&other.start)
    }
}

fn decoded_matches(decoded: &Decoded, path_name: &str) -> bool {
    if let Some(pattern) = path_name.strip_prefix('~') {
        regex::Regex::new(pattern)
            .map(|re| re.is_match(&decoded.path_name))
            .unwrap_or(false)
    } else {
        decoded.path_name == path_name
    }
}

fn walk_decode(template: &str) -> Vec<(std::path::PathBuf, Decoded)> {
    let root = template::common_prefix(template);
    let root = if root.is_empty() {
        Path::new(".")
    } else {
        Path::new(&root)
    };
    if !root.exists() {
        return Vec::new();
    }
    let mut files = Vec::new();
    walk_files(root, &mut files);
    files
        .into_iter()
        .filter_map(|path| {
            let rel = path.to_string_lossy().to_string();
            template::decode(template, &rel).map(|d| (path, d))
        })
        .collect()
}

/// `findSegments(pathConfig, pathName, optionalStart, optionalEnd)`
/// (spec.md §4.A). `start`/`end` filter inclusively when present.
pub fn find_segments(
    template: &str,
    path_name: &str,
    start: Option<DateTime<Local>>,
    end: Option<DateTime<Local>>,
) -> Result<Vec<RecordSegment>> {
    let mut segments: Vec<RecordSegment> = walk_decode(template)
        .into_iter()
        .filter(|(_, d)| decoded_matches(d, path_name))
        .filter(|(_, d)| start.map(|s| d.start_time >= s).unwrap_or(true))
        .filter(|(_, d)| end.map(|e| d.start_time <= e).unwrap_or(true))
        .map(|(path, d)| RecordSegment {
            path,
            start: d.start_time,
        })
        .collect();
    segments.sort();
    if segments.is_empty() {
        return Err(RecordError::NoSegmentsFound(path_name.to_string()).into());
    }
    Ok(segments)
}

/// `findSegmentsInTimespan(pathConfig, pathName, start, duration)`
/// (spec.md §4.A): brackets segments overlapping `[start, start+duration]`.
pub fn find_segments_in_timespan(
    template: &str,
    path_name: &str,
    start: DateTime<Local>,
    duration: Duration,
) -> Result<Vec<RecordSegment>> {
    let end = start + chrono::Duration::from_std(duration).unwrap_or_default();
    let mut segments: Vec<RecordSegment> = walk_decode(template)
        .into_iter()
        .filter(|(_, d)| decoded_matches(d, path_name))
        .filter(|(_, d)| d.start_time <= end)
        .map(|(path, d)| RecordSegment {
            path,
            start: d.start_time,
        })
        .collect();
    segments.sort();

    if segments.is_empty() {
        return Err(RecordError::NoSegmentsFound(path_name.to_string()).into());
    }

    let bracket = segments
        .windows(2)
        .position(|w| w[0].start <= start && start < w[1].start);

    if let Some(i) = bracket {
        return Ok(segments.split_off(i));
    }

    let last = segments.last().expect("non-empty checked above");
    if last.start <= start {
        return Ok(vec![last.clone()]);
    }

    Err(RecordError::NoSegmentsFound(path_name.to_string()).into())
}

/// `findAllPathsWithSegments(allPathConfigs)` (spec.md §4.A).
pub fn find_all_paths_with_segments(templates: &[String]) -> BTreeSet<String> {
    let mut names = HashSet::new();
    for template in templates {
        for (_, decoded) in walk_decode(template) {
            names.insert(decoded.path_name);
        }
    }
    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn touch(dir: &Path, path_name: &str, t: DateTime<Local>) {
        let name = template::encode(path_name, t, "%path-%Y%m%d%H%M%S.mp4");
        fs::write(dir.join(&name), b"x").unwrap();
    }

    #[test]
    fn find_segments_sorts_and_filters_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/%path-%Y%m%d%H%M%S.mp4", dir.path().display());
        let t1 = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Local.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        touch(dir.path(), "cam1", t2);
        touch(dir.path(), "cam1", t1);
        touch(dir.path(), "cam2", t1);

        let segments = find_segments(&template, "cam1", None, None).unwrap();
        assert_eq!(segments.len(), 2);
        assert!(segments[0].start < segments[1].start);
    }

    #[test]
    fn find_segments_errors_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/%path-%Y%m%d%H%M%S.mp4", dir.path().display());
        assert!(find_segments(&template, "cam1", None, None).is_err());
    }

    #[test]
    fn timespan_brackets_segment_covering_start() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/%path-%Y%m%d%H%M%S.mp4", dir.path().display());
        let t1 = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Local.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let t3 = Local.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
        touch(dir.path(), "cam1", t1);
        touch(dir.path(), "cam1", t2);
        touch(dir.path(), "cam1", t3);

        let requested = t2 + chrono::Duration::minutes(10);
        let segments =
            find_segments_in_timespan(&template, "cam1", requested, Duration::from_secs(60))
                .unwrap();
        assert_eq!(segments[0].start, t2);
    }
}
