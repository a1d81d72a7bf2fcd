//! Fragmented-MP4 re-muxer: box walking, initialization parsing, the
//! cut algorithm, and output muxers (spec.md §4.B).

pub mod boxes;
pub mod init;
pub mod muxer;
pub mod remux;
pub mod sample;

pub use init::{SegmentInfo, SegmentInit, TrackInfo};
pub use muxer::{FragmentedMp4Muxer, PlainMp4Muxer};
pub use remux::{cut_segment, CutOutput, CutSample, TrackCut};
