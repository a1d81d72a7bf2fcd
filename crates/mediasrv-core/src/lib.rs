//! Core media dispatch and control plane for a multi-protocol media
//! server: path routing and state, authentication, recording segment
//! indexing, and fragmented-MP4 playback.
//!
//! This crate owns the logic that is independent of any particular
//! wire protocol. A server binary wires protocol listeners (RTSP,
//! RTMP, HLS, WebRTC, SRT) against the [`path`] and [`auth`] modules
//! through the [`request`] boundary types.
//!
//! ```no_run
//! # async fn run() -> mediasrv_core::error::Result<()> {
//! let config = mediasrv_core::config::Config::load("mediasrv.toml")?;
//! let manager = mediasrv_core::path::manager::PathManager::new(config);
//! let _handle = manager.route("cam1").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod config_watcher;
pub mod error;
pub mod mp4;
pub mod path;
pub mod playback;
pub mod record;
pub mod request;

pub use error::{CoreError, Result};
