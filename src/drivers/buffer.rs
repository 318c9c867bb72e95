use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
/// One measurement: seconds since acquisition start and the converted value in volts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}
impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}
/// Samples appended after a given sequence number.
#[derive(Clone, Debug, Default)]
pub struct NewSamples {
    pub samples: Vec<Sample>,
    /// Sequence number to pass on the next call.
    pub next_sequence: u64,
    /// Requested samples that were evicted before they were read.
    pub missed: u64,
}
struct Ring {
    samples: VecDeque<Sample>,
    // sequence number the next append receives; never reset
    next_sequence: u64,
}
impl Ring {
    fn first_sequence(&self) -> u64 {
        self.next_sequence - self.samples.len() as u64
    }
}
/// Bounded FIFO window over the most recent samples, shared between the
/// ingest worker and any number of readers.
///
/// Every operation takes the single internal lock once and holds it only for
/// its own work: `append` for one push (plus at most one eviction), `snapshot`
/// for one copy. Readers therefore never see a torn sequence and the writer is
/// never blocked longer than one copy.
pub struct SampleBuffer {
    ring: Mutex<Ring>,
    capacity: usize,
}
impl SampleBuffer {
    pub const DEFAULT_CAPACITY: usize = 1000;
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                samples: VecDeque::with_capacity(capacity),
                next_sequence: 0,
            }),
            capacity,
        }
    }
    // a panicking reader cannot leave the ring half-written, so poison is ignored
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.lock().samples.is_empty()
    }
    pub fn append(&self, sample: Sample) {
        let mut ring = self.lock();
        if ring.samples.len() == self.capacity {
            ring.samples.pop_front();
        }
        ring.samples.push_back(sample);
        ring.next_sequence += 1;
    }
    pub fn snapshot(&self) -> Vec<Sample> {
        let ring = self.lock();
        ring.samples.iter().copied().collect()
    }
    pub fn latest(&self) -> Option<Sample> {
        self.lock().samples.back().copied()
    }
    pub fn clear(&self) {
        self.lock().samples.clear();
    }
    /// Replace the contents with `samples`, keeping only the newest `capacity`.
    pub fn replace(&self, samples: &[Sample]) {
        let keep = samples.len().saturating_sub(self.capacity);
        let mut ring = self.lock();
        ring.samples.clear();
        ring.samples.extend(samples[keep..].iter().copied());
        ring.next_sequence += samples.len() as u64;
    }
    pub fn next_sequence(&self) -> u64 {
        self.lock().next_sequence
    }
    pub fn samples_since(&self, sequence: u64) -> NewSamples {
        let ring = self.lock();
        let first = ring.first_sequence();
        let start = sequence.clamp(first, ring.next_sequence);
        let skip = (start - first) as usize;
        NewSamples {
            samples: ring.samples.iter().skip(skip).copied().collect(),
            next_sequence: ring.next_sequence,
            missed: start.saturating_sub(sequence),
        }
    }
}
impl Default for SampleBuffer {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}
