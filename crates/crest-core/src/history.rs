//! Circular history of per-interval throughput and worker-count samples.

/// Fixed-capacity sample history, indexed by the controller's monotonic
/// sample counter. Entries are overwritten once the buffers wrap; anything
/// older than `capacity` samples is unreachable.
#[derive(Debug)]
pub struct SampleHistory {
    throughput: Vec<f64>,
    workers: Vec<f64>,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            throughput: vec![0.0; capacity],
            workers: vec![0.0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.throughput.len()
    }

    /// Store one sample at `total_samples mod capacity`.
    pub fn record(&mut self, total_samples: u64, throughput: f64, workers: f64) {
        let index = (total_samples % self.capacity() as u64) as usize;
        self.throughput[index] = throughput;
        self.workers[index] = workers;
    }

    /// Raw throughput ring, for wave extraction.
    pub fn throughput(&self) -> &[f64] {
        &self.throughput
    }

    /// Raw worker-count ring, for wave extraction.
    pub fn workers(&self) -> &[f64] {
        &self.workers
    }

    /// Mean throughput and worker count over the most recent `count`
    /// samples, given the monotonic write counter.
    pub fn window_means(&self, total_samples: u64, count: usize) -> (f64, f64) {
        let capacity = self.capacity() as u64;
        let start = total_samples - count as u64;

        let mut throughput_sum = 0.0;
        let mut worker_sum = 0.0;
        for i in 0..count as u64 {
            let index = ((start + i) % capacity) as usize;
            throughput_sum += self.throughput[index];
            worker_sum += self.workers[index];
        }
        (throughput_sum / count as f64, worker_sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_wraps_and_overwrites() {
        let mut history = SampleHistory::new(4);
        for i in 0..6u64 {
            history.record(i, i as f64, 100.0 + i as f64);
        }
        // Slots 0 and 1 were overwritten by samples 4 and 5.
        assert_eq!(history.throughput(), &[4.0, 5.0, 2.0, 3.0]);
        assert_eq!(history.workers(), &[104.0, 105.0, 102.0, 103.0]);
    }

    #[test]
    fn window_means_cover_only_the_requested_window() {
        let mut history = SampleHistory::new(8);
        for i in 0..8u64 {
            history.record(i, i as f64, 2.0 * i as f64);
        }
        // Last 4 samples are 4,5,6,7.
        let (throughput, workers) = history.window_means(8, 4);
        assert_eq!(throughput, 5.5);
        assert_eq!(workers, 11.0);
    }

    #[test]
    fn window_means_across_the_wrap_point() {
        let mut history = SampleHistory::new(4);
        for i in 0..10u64 {
            history.record(i, i as f64, 1.0);
        }
        // Last 4 samples are 6,7,8,9 regardless of physical layout.
        let (throughput, workers) = history.window_means(10, 4);
        assert_eq!(throughput, 7.5);
        assert_eq!(workers, 1.0);
    }
}
