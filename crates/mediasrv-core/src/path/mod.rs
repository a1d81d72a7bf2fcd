//! Path state machine and Path Manager (spec.md §4.E/§4.F).

pub mod manager;
pub mod source;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{CoreError, PathError, Result};
use crate::request::PathAccessRequest;

use self::stream::{Stream, TrackDescriptor};

/// How long `addReader` parks awaiting a static source to come online
/// before giving up (spec.md §4.E).
pub const READER_PARK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Idle,
    NotReady,
    Ready,
}

/// What `describe` returns for a path (spec.md §4.E).
pub enum Description {
    Stream { tracks: Vec<TrackDescriptor> },
    Redirect { target: String },
}

enum Command {
    AddPublisher {
        req: PathAccessRequest,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    StartPublisher {
        author: Uuid,
        tracks: Vec<TrackDescriptor>,
        reply: oneshot::Sender<Result<()>>,
    },
    StopPublisher {
        author: Uuid,
    },
    AddReader {
        req: PathAccessRequest,
        reply: oneshot::Sender<Result<(Uuid, Arc<Stream>)>>,
    },
    Describe {
        reply: oneshot::Sender<Result<Description>>,
    },
    RemoveReader {
        author: Uuid,
    },
    RemovePublisher {
        author: Uuid,
    },
    Shutdown,
}

/// A lightweight handle to a Path's serial command queue. Cloning is
/// cheap; every clone talks to the same coordinator task.
#[derive(Clone)]
pub struct PathHandle {
    tx: mpsc::Sender<Command>,
}

impl PathHandle {
    pub async fn add_publisher(&self, req: PathAccessRequest) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddPublisher { req, reply }).await?;
        rx.await.map_err(|_| CoreError::Path(PathError::CoordinatorGone))?
    }

    pub async fn start_publisher(&self, author: Uuid, tracks: Vec<TrackDescriptor>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartPublisher { author, tracks, reply }).await?;
        rx.await.map_err(|_| CoreError::Path(PathError::CoordinatorGone))?
    }

    pub async fn stop_publisher(&self, author: Uuid) -> Result<()> {
        self.send(Command::StopPublisher { author }).await
    }

    /// Parks for up to [`READER_PARK_TIMEOUT`] waiting for a static
    /// source to come online before giving up (spec.md §4.E).
    pub async fn add_reader(&self, req: PathAccessRequest) -> Result<(Uuid, Arc<Stream>)> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddReader { req, reply }).await?;
        match tokio::time::timeout(READER_PARK_TIMEOUT, rx).await {
            Ok(result) => result.map_err(|_| CoreError::Path(PathError::CoordinatorGone))?,
            Err(_) => Err(CoreError::Path(PathError::NoOnePublishing)),
        }
    }

    pub async fn describe(&self) -> Result<Description> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Describe { reply }).await?;
        rx.await.map_err(|_| CoreError::Path(PathError::CoordinatorGone))?
    }

    pub async fn remove_reader(&self, author: Uuid) -> Result<()> {
        self.send(Command::RemoveReader { author }).await
    }

    pub async fn remove_publisher(&self, author: Uuid) -> Result<()> {
        self.send(Command::RemovePublisher { author }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| CoreError::Path(PathError::CoordinatorGone))
    }
}

struct PathActor {
    redirect_target: Option<String>,
    state: PathState,
    publisher: Option<Uuid>,
    stream: Option<Arc<Stream>>,
    pending_readers: Vec<oneshot::Sender<Result<(Uuid, Arc<Stream>)>>>,
}

/// Spawns a new Path coordinator task and returns its handle. `redirect_target`
/// makes this path a pure redirect (spec.md §4.E `describe`).
pub fn spawn(redirect_target: Option<String>) -> PathHandle {
    let (tx, mut rx) = mpsc::channel::<Command>(64);
    let mut actor = PathActor {
        redirect_target,
        state: PathState::Idle,
        publisher: None,
        stream: None,
        pending_readers: Vec::new(),
    };

    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                Command::AddPublisher { req, reply } => {
                    let _ = req;
                    let result = if actor.publisher.is_some() {
                        Err(CoreError::Path(PathError::AlreadyPublishing))
                    } else {
                        let id = Uuid::new_v4();
                        actor.publisher = Some(id);
                        actor.state = PathState::NotReady;
                        Ok(id)
                    };
                    let _ = reply.send(result);
                }
                Command::StartPublisher { author, tracks, reply } => {
                    let result = if actor.publisher != Some(author) {
                        Err(CoreError::Path(PathError::NoOnePublishing))
                    } else {
                        let stream = Arc::new(Stream::new(tracks));
                        actor.stream = Some(stream.clone());
                        actor.state = PathState::Ready;
                        for pending in actor.pending_readers.drain(..) {
                            let (id, _rx) = stream.add_reader();
                            let _ = pending.send(Ok((id, stream.clone())));
                        }
                        Ok(())
                    };
                    let _ = reply.send(result);
                }
                Command::StopPublisher { author } => {
                    if actor.publisher == Some(author) {
                        actor.publisher = None;
                        actor.stream = None;
                        actor.state = if actor.redirect_target.is_some() {
                            PathState::NotReady
                        } else {
                            PathState::Idle
                        };
                        for pending in actor.pending_readers.drain(..) {
                            let _ = pending.send(Err(CoreError::Path(PathError::NoOnePublishing)));
                        }
                    }
                }
                Command::AddReader { req, reply } => {
                    let _ = req;
                    match (&actor.state, &actor.stream) {
                        (PathState::Ready, Some(stream)) => {
                            let (id, _rx) = stream.add_reader();
                            let _ = reply.send(Ok((id, stream.clone())));
                        }
                        _ => actor.pending_readers.push(reply),
                    }
                }
                Command::Describe { reply } => {
                    let result = if let Some(target) = &actor.redirect_target {
                        Ok(Description::Redirect {
                            target: target.clone(),
                        })
                    } else if let Some(stream) = &actor.stream {
                        Ok(Description::Stream {
                            tracks: stream.tracks.clone(),
                        })
                    } else {
                        Err(CoreError::Path(PathError::NoOnePublishing))
                    };
                    let _ = reply.send(result);
                }
                Command::RemoveReader { author } => {
                    if let Some(stream) = &actor.stream {
                        stream.remove_reader(author);
                    }
                }
                Command::RemovePublisher { author } => {
                    if actor.publisher == Some(author) {
                        actor.publisher = None;
                        actor.stream = None;
                        actor.state = PathState::Idle;
                    }
                }
                Command::Shutdown => {
                    for pending in actor.pending_readers.drain(..) {
                        let _ = pending.send(Err(CoreError::Path(PathError::CoordinatorGone)));
                    }
                    break;
                }
            }
        }
    });

    PathHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn req() -> PathAccessRequest {
        PathAccessRequest::new("cam1", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)))
    }

    #[tokio::test]
    async fn second_publisher_is_rejected() {
        let handle = spawn(None);
        let first = handle.add_publisher(req()).await.unwrap();
        let second = handle.add_publisher(req()).await;
        assert!(second.is_err());
        handle.remove_publisher(first).await.unwrap();
    }

    #[tokio::test]
    async fn reader_parked_until_publisher_ready() {
        let handle = spawn(None);
        let h2 = handle.clone();
        let parked = tokio::spawn(async move { h2.add_reader(req()).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let publisher = handle.add_publisher(req()).await.unwrap();
        handle.start_publisher(publisher, vec![]).await.unwrap();

        let result = parked.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn reader_gives_up_after_park_timeout() {
        let handle = spawn(None);
        let parked = tokio::spawn(async move { handle.add_reader(req()).await });

        tokio::time::advance(READER_PARK_TIMEOUT + Duration::from_millis(1)).await;

        let result = parked.await.unwrap();
        assert!(matches!(
            result,
            Err(CoreError::Path(PathError::NoOnePublishing))
        ));
    }

    #[tokio::test]
    async fn describe_reports_redirect() {
        let handle = spawn(Some("other-path".to_string()));
        match handle.describe().await.unwrap() {
            Description::Redirect { target } => assert_eq!(target, "other-path"),
            _ => panic!("expected redirect"),
        }
    }
}
