//! Stream fan-out: each reader owns a bounded ring; the publisher
//! writes to every ring without blocking on a slow one (spec.md §9
//! "Stream fan-out").

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

const READER_QUEUE_CAPACITY: usize = 256;

/// One track's media description, opaque to the core beyond what
/// concatenability and fan-out need (spec.md §4.E `startPublisher(desc)`).
#[derive(Debug, Clone)]
pub struct TrackDescriptor {
    pub id: u32,
    pub codec: String,
}

/// Multi-reader fan-out buffer owned by a Path while a publisher is
/// active (spec.md GLOSSARY "Stream").
pub struct Stream {
    pub tracks: Vec<TrackDescriptor>,
    readers: DashMap<Uuid, mpsc::Sender<Bytes>>,
}

impl Stream {
    pub fn new(tracks: Vec<TrackDescriptor>) -> Self {
        Self {
            tracks,
            readers: DashMap::new(),
        }
    }

    /// Registers a new reader, returning its receiving half.
    pub fn add_reader(&self) -> (Uuid, mpsc::Receiver<Bytes>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(READER_QUEUE_CAPACITY);
        self.readers.insert(id, tx);
        (id, rx)
    }

    pub fn remove_reader(&self, id: Uuid) {
        self.readers.remove(&id);
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// Writes `data` to every reader's ring. A reader whose queue is
    /// full is dropped immediately rather than slowing the publisher
    /// or any other reader (spec.md §5 "a slow reader must not block").
    pub fn write(&self, data: Bytes) {
        let mut too_slow = Vec::new();
        for entry in self.readers.iter() {
            match entry.value().try_send(data.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => too_slow.push(*entry.key()),
                Err(mpsc::error::TrySendError::Closed(_)) => too_slow.push(*entry.key()),
            }
        }
        for id in too_slow {
            tracing::debug!(reader = %id, "closing reader: too slow");
            self.readers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_reaches_all_readers() {
        let stream = Stream::new(vec![]);
        let (_, mut rx1) = stream.add_reader();
        let (_, mut rx2) = stream.add_reader();

        stream.write(Bytes::from_static(b"hello"));

        assert_eq!(rx1.recv().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(rx2.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn overflow_closes_only_the_slow_reader() {
        let stream = Stream::new(vec![]);
        let (_, mut fast) = stream.add_reader();
        let (_slow_id, _slow_rx) = stream.add_reader();

        for _ in 0..READER_QUEUE_CAPACITY + 1 {
            stream.write(Bytes::from_static(b"x"));
            fast.try_recv().ok();
        }

        assert_eq!(stream.reader_count(), 1);
    }
}
