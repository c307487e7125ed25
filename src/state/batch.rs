//! Detail record accumulator flushed at a size threshold

use std::sync::Mutex;

/// One extracted marker for one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRecord {
    pub identifier: String,

    /// Markup of the expected-content element, or `None` when it was missing
    pub marker: Option<String>,
}

/// Thread-safe batch of detail records
///
/// `push` checks the size, takes the full batch and clears it under one
/// lock, so each threshold crossing yields exactly one flush.
#[derive(Debug)]
pub struct DetailBatch {
    size: usize,
    records: Mutex<Vec<DetailRecord>>,
}

impl DetailBatch {
    /// Creates an empty batch that flushes every `size` records
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            records: Mutex::new(Vec::with_capacity(size)),
        }
    }

    /// Appends a record; returns the full batch when the threshold is reached
    pub fn push(&self, record: DetailRecord) -> Option<Vec<DetailRecord>> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.push(record);
        if records.len() >= self.size {
            Some(std::mem::replace(
                &mut *records,
                Vec::with_capacity(self.size),
            ))
        } else {
            None
        }
    }

    /// Puts records from a failed flush back in front of the pending ones
    pub fn restore(&self, mut failed: Vec<DetailRecord>) {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        failed.append(&mut records);
        *records = failed;
    }

    /// Takes whatever is pending, for the final partial flush
    pub fn drain(&self) -> Vec<DetailRecord> {
        std::mem::take(
            &mut *self
                .records
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    pub fn pending(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn record(i: usize) -> DetailRecord {
        DetailRecord {
            identifier: format!("B{:09}", i),
            marker: Some("<div></div>".to_string()),
        }
    }

    #[test]
    fn test_exact_batch_size_flushes_once_with_no_leftover() {
        let batch = DetailBatch::new(4);
        let flushes: Vec<_> = (0..4).filter_map(|i| batch.push(record(i))).collect();

        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].len(), 4);
        assert_eq!(batch.pending(), 0);
    }

    #[test]
    fn test_batch_size_plus_one_leaves_one_pending() {
        let batch = DetailBatch::new(4);
        let flushes: Vec<_> = (0..5).filter_map(|i| batch.push(record(i))).collect();

        assert_eq!(flushes.len(), 1);
        assert_eq!(batch.pending(), 1);
        assert_eq!(batch.drain(), vec![record(4)]);
        assert_eq!(batch.pending(), 0);
    }

    #[test]
    fn test_restore_keeps_order() {
        let batch = DetailBatch::new(2);
        let flushed = batch.push(record(0)).or_else(|| batch.push(record(1))).unwrap();
        batch.push(record(2));
        batch.restore(flushed);

        let drained = batch.drain();
        let ids: Vec<_> = drained.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["B000000000", "B000000001", "B000000002"]);
    }

    #[test]
    fn test_concurrent_pushes_flush_every_record_exactly_once() {
        let batch = Arc::new(DetailBatch::new(10));
        let flushed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let batch = Arc::clone(&batch);
                let flushed = Arc::clone(&flushed);
                std::thread::spawn(move || {
                    for i in 0..125 {
                        if let Some(full) = batch.push(record(t * 1000 + i)) {
                            assert_eq!(full.len(), 10);
                            flushed.fetch_add(full.len(), Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(flushed.load(Ordering::SeqCst) + batch.pending(), 1000);
        assert_eq!(batch.pending(), 0);
    }
}
