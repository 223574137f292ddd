//! Bounded per-signal sample storage.

use std::collections::VecDeque;
use std::time::Duration;

use crate::types::Sample;

/// A named, capacity-bounded sequence of [`Sample`]s.
///
/// Appends past `capacity` evict from the front, one `pop_front` per excess
/// sample, so the cost per append is O(1) regardless of how many samples a
/// notification carries. Order is never changed.
#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    capacity: usize,
    samples: VecDeque<Sample>,
    next_index: u64,
}

impl Channel {
    /// A zero capacity is raised to one.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            samples: VecDeque::with_capacity(capacity.min(4096)),
            next_index: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total samples appended since the last reset, evicted ones included.
    pub fn total_appended(&self) -> u64 {
        self.next_index
    }

    /// Stamp `value` with this channel's next sequence index and append it.
    pub fn push(&mut self, value: f64, elapsed: Duration) -> &Sample {
        let sample = Sample::new(self.next_index, value, elapsed);
        self.append(sample);
        // append() never leaves the deque empty
        &self.samples[self.samples.len() - 1]
    }

    /// Append a sample produced elsewhere, keeping its index and label.
    pub fn append(&mut self, sample: Sample) {
        self.next_index = self.next_index.max(sample.sequence_index + 1);
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn append_many(&mut self, samples: impl IntoIterator<Item = Sample>) {
        for sample in samples {
            self.append(sample);
        }
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Current contents in append order.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    /// The trailing `n` samples (fewer if the channel is shorter).
    pub fn tail(&self, n: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).cloned().collect()
    }

    /// Drop all samples and restart sequence numbering at zero.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.next_index = 0;
    }
}
