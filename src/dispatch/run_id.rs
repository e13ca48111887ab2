//! Unique run identifiers.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out run ids of the form `20261016T093512123Z-000042`.
///
/// The timestamp keeps ids sortable across restarts; the sequence makes them
/// unique within a process even when two runs start in the same millisecond.
#[derive(Debug, Default)]
pub struct RunIdAllocator {
    sequence: AtomicU64,
}

impl RunIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:06}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"), seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_unique_across_threads() {
        let allocator = Arc::new(RunIdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || {
                    (0..250).map(|_| allocator.next_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_id_format() {
        let id = RunIdAllocator::new().next_id();
        let (stamp, seq) = id.split_once('-').unwrap();
        assert_eq!(stamp.len(), "20261016T093512123Z".len());
        assert_eq!(seq, "000000");
    }
}
