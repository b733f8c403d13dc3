use crate::common::*;

/// Training speed measured over a span of batches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub batches_per_sec: f64,
    pub samples_per_sec: f64,
}

#[derive(Debug)]
struct Span {
    start: Instant,
    batches: usize,
    samples: usize,
}

impl Span {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            batches: 0,
            samples: 0,
        }
    }

    fn take(&mut self) -> Throughput {
        // a zero-length span would divide by zero
        let secs = self.start.elapsed().as_secs_f64().max(1e-9);
        let throughput = Throughput {
            batches_per_sec: self.batches as f64 / secs,
            samples_per_sec: self.samples as f64 / secs,
        };
        *self = Self::new();
        throughput
    }
}

/// Measures the training throughput of an epoch.
///
/// The meter reports a running rate once per interval for the console
/// and an average over the whole training phase for the event log.
#[derive(Debug)]
pub struct ThroughputMeter {
    interval: Duration,
    window: Span,
    epoch: Span,
}

impl ThroughputMeter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window: Span::new(),
            epoch: Span::new(),
        }
    }

    pub fn with_second_interval() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Restart the measurement at the beginning of a training phase.
    pub fn start_epoch(&mut self) {
        self.window = Span::new();
        self.epoch = Span::new();
    }

    /// Count a finished batch of `samples` samples.
    pub fn record(&mut self, samples: usize) {
        for span in [&mut self.window, &mut self.epoch] {
            span.batches += 1;
            span.samples += samples;
        }
    }

    /// The rate since the last report, once the interval has elapsed.
    pub fn poll(&mut self) -> Option<Throughput> {
        if self.window.batches == 0 || self.window.start.elapsed() < self.interval {
            return None;
        }
        Some(self.window.take())
    }

    /// The average rate of the training phase since [`Self::start_epoch`].
    pub fn finish_epoch(&mut self) -> Throughput {
        self.window = Span::new();
        self.epoch.take()
    }
}
