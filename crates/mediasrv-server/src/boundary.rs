//! Minimal publisher/reader boundary traits.
//!
//! No wire protocol (RTSP/RTMP/HLS/WebRTC/SRT) is implemented here — that
//! framing is explicitly out of scope. These traits are the seam a
//! protocol listener would implement against to drive the dispatch core
//! without this crate knowing anything about the wire format; tests and
//! examples use them directly to exercise path routing and auth.

use async_trait::async_trait;
use bytes::Bytes;
use mediasrv_core::error::Result;
use mediasrv_core::path::stream::TrackDescriptor;
use mediasrv_core::request::PathAccessRequest;

/// Drives a Path from the publishing side: announces tracks once, then
/// feeds payload units until stopped.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn announce(&self, req: PathAccessRequest) -> Result<Vec<TrackDescriptor>>;
    async fn write(&self, track_id: u32, payload: Bytes);
}

/// Drives a Path from the reading side: receives fan-out units for
/// whichever tracks the Path is streaming.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn next(&mut self) -> Option<Bytes>;
}
