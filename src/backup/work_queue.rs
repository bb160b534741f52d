//! Shared FIFO of pending path units, plus the destination lookup table.

use crate::backup::destination::DestinationQueue;
use crate::backup::path_unit::{DestinationId, PathUnit};

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct PendingUnits {
    units: VecDeque<PathUnit>,
    abandoned: bool,
}

/// Work shared by every discovery worker of a run.
///
/// Directory expansion pushes children back here, so any idle worker can pick
/// up subdirectories discovered by another one.
#[derive(Debug)]
pub struct SourceWorkQueue {
    units: Mutex<PendingUnits>,
    destinations: HashMap<DestinationId, Arc<DestinationQueue>>,
}

impl SourceWorkQueue {
    pub fn new<U, D>(units: U, destinations: D) -> Self
    where
        U: IntoIterator<Item = PathUnit>,
        D: IntoIterator<Item = Arc<DestinationQueue>>,
    {
        Self {
            units: Mutex::new(PendingUnits {
                units: units.into_iter().collect(),
                abandoned: false,
            }),
            destinations: destinations
                .into_iter()
                .map(|d| (d.destination().clone(), d))
                .collect(),
        }
    }

    // A panicking worker never leaves the deque half-modified, so the data is
    // still usable after poisoning.
    fn lock(&self) -> MutexGuard<'_, PendingUnits> {
        self.units.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().units.len()
    }

    /// Removes the head unit, or `None` when the queue is empty. Never blocks
    /// beyond the critical section.
    pub fn try_dequeue(&self) -> Option<PathUnit> {
        self.lock().units.pop_front()
    }

    /// Appends to the tail. Ignored once the queue is abandoned.
    pub fn enqueue(&self, unit: PathUnit) {
        self.enqueue_all(std::iter::once(unit));
    }

    /// Appends several units under one lock acquisition.
    pub fn enqueue_all<I: IntoIterator<Item = PathUnit>>(&self, units: I) {
        let mut pending = self.lock();
        if !pending.abandoned {
            pending.units.extend(units);
        }
    }

    /// Drops every pending unit, and every unit enqueued later, so running
    /// workers wind down after their current unit. Returns how many pending
    /// units were dropped.
    pub fn abandon(&self) -> usize {
        let mut pending = self.lock();
        pending.abandoned = true;
        let dropped = pending.units.len();
        pending.units.clear();
        dropped
    }

    pub fn lookup_destination(&self, id: &DestinationId) -> Option<&Arc<DestinationQueue>> {
        self.destinations.get(id)
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Arc<DestinationQueue>> {
        self.destinations.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::path_unit::CopyMode;
    use crate::backup::stat::BackupStat;
    use std::path::PathBuf;

    fn unit(p: &str) -> PathUnit {
        PathUnit::file(PathBuf::from(p), CopyMode::All)
    }

    #[test]
    fn test_fifo_order() {
        let queue = SourceWorkQueue::new([unit("/a"), unit("/b")], []);
        queue.enqueue(unit("/c"));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_dequeue(), Some(unit("/a")));
        assert_eq!(queue.try_dequeue(), Some(unit("/b")));
        assert_eq!(queue.try_dequeue(), Some(unit("/c")));
        assert_eq!(queue.try_dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_abandon_clears_queue() {
        let queue = SourceWorkQueue::new([unit("/a")], []);
        queue.enqueue_all([unit("/b"), unit("/c")]);
        assert_eq!(queue.abandon(), 3);
        assert!(queue.try_dequeue().is_none());
        queue.enqueue(unit("/d"));
        assert!(queue.is_empty());
        assert_eq!(queue.abandon(), 0);
    }

    #[test]
    fn test_lookup_destination() {
        let stat = Arc::new(BackupStat::default());
        let dest = Arc::new(DestinationQueue::new("C".into(), stat));
        let queue = SourceWorkQueue::new([], [dest.clone()]);

        let found = queue.lookup_destination(&"C".into()).unwrap();
        assert!(Arc::ptr_eq(found, &dest));
        assert!(queue.lookup_destination(&"D".into()).is_none());
        assert_eq!(queue.destinations().count(), 1);
    }

    #[test]
    fn test_concurrent_dequeue_takes_each_unit_once() {
        let units = (0..1000).map(|i| unit(&format!("/f{i}")));
        let queue = Arc::new(SourceWorkQueue::new(units, []));

        let handles = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    let mut taken = 0;
                    while queue.try_dequeue().is_some() {
                        taken += 1;
                    }
                    taken
                })
            })
            .collect::<Vec<_>>();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1000);
    }
}
