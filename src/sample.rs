//! Metric samples and the sources that hand them to the exporter

use chrono::Utc;
use log::{debug, trace};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One observation of a metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Dotted metric path, e.g. `servers.web01.requests`
    pub path: String,
    /// Observed value
    pub value: f64,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
}

impl MetricSample {
    pub fn new(path: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            path: path.into(),
            value,
            timestamp,
        }
    }

    /// Create a sample stamped with the current time
    pub fn now(path: impl Into<String>, value: f64) -> Self {
        Self::new(path, value, Utc::now().timestamp())
    }

    /// Render the sample in the plaintext line protocol, newline included
    pub fn to_line(&self) -> String {
        format!("{} {} {}\n", self.path, self.value, self.timestamp)
    }
}

/// Something that can hand over the current set of samples on each tick
pub trait SampleSource: Send + Sync + 'static {
    /// Take a snapshot of the samples to export
    fn snapshot(&self) -> Vec<MetricSample>;
}

impl<F> SampleSource for F
where
    F: Fn() -> Vec<MetricSample> + Send + Sync + 'static,
{
    fn snapshot(&self) -> Vec<MetricSample> {
        (self)()
    }
}

/// Create a bounded channel decoupling metric recording from export
///
/// The recorder never waits: when the channel is full the sample is dropped
/// and counted, so a stalled exporter cannot slow down the code recording
/// metrics.
pub fn sample_channel(capacity: usize) -> (SampleRecorder, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));

    (
        SampleRecorder {
            tx,
            dropped: Arc::clone(&dropped),
        },
        ChannelSource {
            rx: Mutex::new(rx),
            dropped,
        },
    )
}

/// Recording half of a sample channel
#[derive(Clone)]
pub struct SampleRecorder {
    tx: mpsc::Sender<MetricSample>,
    dropped: Arc<AtomicU64>,
}

impl SampleRecorder {
    /// Record a sample, returning false if it had to be dropped
    pub fn record(&self, sample: MetricSample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Dropped sample: {}", e);
                false
            }
        }
    }

    /// Number of samples dropped because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Export half of a sample channel
pub struct ChannelSource {
    rx: Mutex<mpsc::Receiver<MetricSample>>,
    dropped: Arc<AtomicU64>,
}

impl SampleSource for ChannelSource {
    fn snapshot(&self) -> Vec<MetricSample> {
        let mut rx = match self.rx.lock() {
            Ok(rx) => rx,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut samples = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            samples.push(sample);
        }

        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            debug!("{} samples were dropped since the last snapshot", dropped);
        }

        samples
    }
}
