//! Per-destination queue of file paths waiting to be compressed.

use crate::backup::path_unit::DestinationId;
use crate::backup::stat::BackupStat;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    /// Accepting pushes
    Open,
    /// The writer stopped waiting for input; pushes are rejected
    Closed,
    /// The writer could not open its container; pushes are counted and dropped
    Abandoned,
}

/// Many-producer, single-consumer FIFO bound to one destination container.
///
/// Producers take the read side of `state` for the whole push, so once
/// [`close_for_writing`](Self::close_for_writing) returns every accepted path
/// is already in the channel and [`drain_remaining`](Self::drain_remaining)
/// sees it.
#[derive(Debug)]
pub struct DestinationQueue {
    destination: DestinationId,
    state: RwLock<QueueState>,
    tx: Sender<Arc<Path>>,
    rx: Receiver<Arc<Path>>,
    stats: Arc<BackupStat>,
}

impl DestinationQueue {
    pub fn new(destination: DestinationId, stats: Arc<BackupStat>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            destination,
            state: RwLock::new(QueueState::Open),
            tx,
            rx,
            stats,
        }
    }

    pub fn destination(&self) -> &DestinationId {
        &self.destination
    }

    pub fn stats(&self) -> &Arc<BackupStat> {
        &self.stats
    }

    fn read_state(&self) -> RwLockReadGuard<'_, QueueState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, QueueState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> QueueState {
        *self.read_state()
    }

    /// Number of paths buffered and not yet popped.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Queues `path` for compression and counts it as discovered.
    ///
    /// Returns the path back when the queue is closed; such a path is not
    /// counted and will never be written.
    pub fn push<P: Into<Arc<Path>>>(&self, path: P) -> Result<(), Arc<Path>> {
        let path = path.into();
        let state = self.read_state();
        match *state {
            QueueState::Open => {
                // counted before it is visible to the writer
                self.stats.increment_total_file();
                self.tx
                    .send(path)
                    .map_err(|e| e.into_inner())
                    .inspect_err(|_| self.stats.increment_skipped_file())
            }
            QueueState::Abandoned => {
                tracing::warn!(
                    "Destination {} is abandoned, {:?} will not be written",
                    self.destination,
                    path
                );
                self.stats.increment_total_file();
                self.stats.increment_skipped_file();
                Ok(())
            }
            QueueState::Closed => Err(path),
        }
    }

    /// Waits up to `timeout` for the next path.
    pub fn try_pop(&self, timeout: Duration) -> Option<Arc<Path>> {
        match self.rx.recv_timeout(timeout) {
            Ok(path) => Some(path),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Pops without waiting.
    pub fn try_pop_now(&self) -> Option<Arc<Path>> {
        self.rx.try_recv().ok()
    }

    /// Stops accepting new paths. Everything pushed before this call stays
    /// buffered for [`drain_remaining`](Self::drain_remaining).
    pub fn close_for_writing(&self) {
        let mut state = self.write_state();
        if *state == QueueState::Open {
            *state = QueueState::Closed;
        }
    }

    /// Yields every buffered path in FIFO order, then ends.
    pub fn drain_remaining(&self) -> impl Iterator<Item = Arc<Path>> + '_ {
        self.rx.try_iter()
    }

    /// Gives up on this destination: buffered and future paths are counted as
    /// skipped. Returns how many buffered paths were dropped.
    pub fn abandon(&self) -> usize {
        let mut state = self.write_state();
        *state = QueueState::Abandoned;
        let dropped = self
            .rx
            .try_iter()
            .inspect(|path| tracing::debug!("Dropping {:?} for abandoned destination", path))
            .count();
        (0..dropped).for_each(|_| self.stats.increment_skipped_file());
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn queue() -> DestinationQueue {
        DestinationQueue::new("C".into(), Arc::new(BackupStat::default()))
    }

    fn path(p: &str) -> Arc<Path> {
        PathBuf::from(p).into()
    }

    #[test]
    fn test_push_counts_total_files() {
        let queue = queue();
        queue.push(path("/a")).unwrap();
        queue.push(path("/b")).unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.stats().total_files(), 2);
        assert_eq!(queue.stats().current_files(), 0);
    }

    #[test]
    fn test_try_pop_times_out_on_empty() {
        let queue = queue();
        assert!(queue.try_pop(Duration::from_millis(5)).is_none());
        assert!(queue.try_pop_now().is_none());
    }

    #[test]
    fn test_close_then_drain_in_fifo_order() {
        let queue = queue();
        for p in ["/1", "/2", "/3"] {
            queue.push(path(p)).unwrap();
        }
        assert_eq!(queue.try_pop(Duration::from_millis(5)), Some(path("/1")));

        queue.close_for_writing();
        assert_eq!(queue.state(), QueueState::Closed);
        assert_eq!(queue.push(path("/late")), Err(path("/late")));

        let drained: Vec<_> = queue.drain_remaining().collect();
        assert_eq!(drained, vec![path("/2"), path("/3")]);
        assert_eq!(queue.drain_remaining().count(), 0);
        // the rejected push was never counted
        assert_eq!(queue.stats().total_files(), 3);
    }

    #[test]
    fn test_abandon_counts_buffered_and_later_pushes_as_skipped() {
        let queue = queue();
        queue.push(path("/a")).unwrap();
        queue.push(path("/b")).unwrap();

        assert_eq!(queue.abandon(), 2);
        assert!(queue.is_empty());
        queue.push(path("/c")).unwrap();
        assert!(queue.is_empty());

        let snapshot = queue.stats().snapshot();
        assert_eq!(snapshot.total_files, 3);
        assert_eq!(snapshot.skipped_files, 3);
        assert!(snapshot.is_settled());
    }

    #[test]
    fn test_close_does_not_reopen_abandoned() {
        let queue = queue();
        queue.abandon();
        queue.close_for_writing();
        assert_eq!(queue.state(), QueueState::Abandoned);
    }

    #[test]
    fn test_concurrent_producers_with_one_consumer() {
        let queue = Arc::new(queue());
        let producers = (0..4)
            .map(|t| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(path(&format!("/t{t}/f{i}"))).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        let mut popped = 0;
        while popped < 1000 {
            if queue.try_pop(Duration::from_millis(100)).is_some() {
                popped += 1;
            }
        }
        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(popped, 1000);
        assert_eq!(queue.stats().total_files(), 1000);
    }
}
