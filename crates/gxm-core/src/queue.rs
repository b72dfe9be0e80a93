//! Priority queue of jobs waiting for a worker slot.
//!
//! Entries are kept sorted by tier (High first) and, within a tier, by
//! submission sequence. Paused jobs stay in the queue as parked entries: they
//! keep their place but `try_take_next` skips them until `unpark`.

use std::sync::{Mutex, MutexGuard};

use crate::job::{JobId, Priority};

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    id: JobId,
    priority: Priority,
    seq: u64,
    parked: bool,
}

impl QueueEntry {
    /// True when `self` must be served before `other`.
    fn ahead_of(&self, other: &QueueEntry) -> bool {
        self.priority > other.priority || (self.priority == other.priority && self.seq < other.seq)
    }
}

/// Internally synchronized; callers never hold the lock.
#[derive(Debug, Default)]
pub struct JobQueue {
    entries: Mutex<Vec<QueueEntry>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueueEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_sorted(entries: &mut Vec<QueueEntry>, entry: QueueEntry) {
        let pos = entries
            .iter()
            .position(|e| entry.ahead_of(e))
            .unwrap_or(entries.len());
        entries.insert(pos, entry);
    }

    /// Add an eligible job. Returns false if the id is already queued.
    pub fn enqueue(&self, id: JobId, priority: Priority, seq: u64) -> bool {
        self.insert(id, priority, seq, false)
    }

    /// Re-insert a paused job as a parked entry at its original position.
    pub fn park(&self, id: JobId, priority: Priority, seq: u64) -> bool {
        self.insert(id, priority, seq, true)
    }

    fn insert(&self, id: JobId, priority: Priority, seq: u64, parked: bool) -> bool {
        let mut entries = self.lock();
        if entries.iter().any(|e| e.id == id) {
            return false;
        }
        Self::insert_sorted(
            &mut entries,
            QueueEntry {
                id,
                priority,
                seq,
                parked,
            },
        );
        true
    }

    /// Make a parked entry eligible again. Its position does not change.
    pub fn unpark(&self, id: JobId) -> bool {
        let mut entries = self.lock();
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if entry.parked => {
                entry.parked = false;
                true
            }
            _ => false,
        }
    }

    /// Remove and return the first eligible (non-parked) job.
    pub fn try_take_next(&self) -> Option<JobId> {
        let mut entries = self.lock();
        let pos = entries.iter().position(|e| !e.parked)?;
        Some(entries.remove(pos).id)
    }

    pub fn remove(&self, id: JobId) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|e| e.id == id) {
            Some(pos) => {
                entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Move an entry to another tier, keeping its submission sequence.
    pub fn reprioritize(&self, id: JobId, priority: Priority) -> bool {
        let mut entries = self.lock();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let mut entry = entries.remove(pos);
        entry.priority = priority;
        Self::insert_sorted(&mut entries, entry);
        true
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.lock().iter().any(|e| e.id == id)
    }

    /// All entries, parked included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Entries eligible for dispatch.
    pub fn depth(&self) -> usize {
        self.lock().iter().filter(|e| !e.parked).count()
    }

    /// Ids in dispatch order, parked entries included.
    pub fn order(&self) -> Vec<JobId> {
        self.lock().iter().map(|e| e.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fifo_within_tier() {
        let q = JobQueue::new();
        q.enqueue(1, Priority::Normal, 1);
        q.enqueue(2, Priority::Normal, 2);
        q.enqueue(3, Priority::Normal, 3);
        assert_eq!(q.try_take_next(), Some(1));
        assert_eq!(q.try_take_next(), Some(2));
        assert_eq!(q.try_take_next(), Some(3));
        assert_eq!(q.try_take_next(), None);
    }

    #[test]
    fn high_goes_ahead_of_queued_normal_and_low() {
        let q = JobQueue::new();
        q.enqueue(1, Priority::Low, 1);
        q.enqueue(2, Priority::Normal, 2);
        q.enqueue(3, Priority::High, 3);
        q.enqueue(4, Priority::Normal, 4);
        assert_eq!(q.order(), vec![3, 2, 4, 1]);
    }

    #[test]
    fn parked_entries_are_skipped_until_unparked() {
        let q = JobQueue::new();
        q.enqueue(2, Priority::Normal, 2);
        q.park(1, Priority::Normal, 1);
        assert_eq!(q.len(), 2);
        assert_eq!(q.depth(), 1);
        assert_eq!(q.try_take_next(), Some(2));
        assert_eq!(q.try_take_next(), None);
        assert!(q.contains(1));

        assert!(q.unpark(1));
        assert!(!q.unpark(1));
        assert_eq!(q.try_take_next(), Some(1));
        assert!(q.is_empty());
    }

    #[test]
    fn resumed_job_keeps_original_position() {
        let q = JobQueue::new();
        q.park(1, Priority::Normal, 1);
        q.enqueue(2, Priority::Normal, 2);
        q.enqueue(3, Priority::Normal, 3);
        q.unpark(1);
        assert_eq!(q.order(), vec![1, 2, 3]);
    }

    #[test]
    fn reprioritize_moves_between_tiers() {
        let q = JobQueue::new();
        q.enqueue(1, Priority::Normal, 1);
        q.enqueue(2, Priority::Normal, 2);
        q.enqueue(3, Priority::Low, 3);
        assert!(q.reprioritize(3, Priority::High));
        assert_eq!(q.order(), vec![3, 1, 2]);
        assert!(q.reprioritize(3, Priority::Normal));
        assert_eq!(q.order(), vec![1, 2, 3]);
        assert!(!q.reprioritize(99, Priority::High));
    }

    #[test]
    fn duplicate_ids_and_remove() {
        let q = JobQueue::new();
        assert!(q.enqueue(1, Priority::Normal, 1));
        assert!(!q.enqueue(1, Priority::High, 2));
        assert!(q.remove(1));
        assert!(!q.remove(1));
        assert!(q.is_empty());
    }

    #[test]
    fn concurrent_producers_and_consumers_neither_lose_nor_duplicate() {
        let q = Arc::new(JobQueue::new());
        let producers: Vec<_> = (0..4u64)
            .map(|t| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    for i in 0..250u64 {
                        let id = t * 1000 + i;
                        q.enqueue(id, Priority::Normal, id);
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    let mut got = Vec::new();
                    let mut idle = 0;
                    while idle < 1000 {
                        match q.try_take_next() {
                            Some(id) => {
                                got.push(id);
                                idle = 0;
                            }
                            None => {
                                idle += 1;
                                std::thread::yield_now();
                            }
                        }
                    }
                    got
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        let mut all: Vec<JobId> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        while let Some(id) = q.try_take_next() {
            all.push(id);
        }
        all.sort_unstable();
        let before = all.len();
        all.dedup();
        assert_eq!(before, all.len());
        assert_eq!(all.len(), 1000);
    }
}
