//! Periodic report scheduling and the binding of a sender to a schedule

use log::{debug, info, trace, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::endpoint::{Scheme, Target};
use crate::error::{DeliveryErrorKind, ExportError, Result};
use crate::sample::SampleSource;
use crate::sender::Sender;

/// Future produced by a report callback
pub type ReportFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A callback run by a report host
pub type ReportCallback = Arc<dyn Fn() -> ReportFuture + Send + Sync>;

/// A host that runs callbacks on a fixed schedule
pub trait ReportHost: Send + Sync {
    /// Run `callback` every `interval` for the rest of the host's life
    fn register_periodic(&self, name: &str, interval: Duration, callback: ReportCallback)
    -> Result<()>;

    /// Run `hook` once when the host shuts down
    ///
    /// Bindings use this for their final flush, so a host that cannot honour
    /// it should return an error rather than drop the hook.
    fn register_shutdown(&self, name: &str, hook: ReportCallback) -> Result<()>;
}

fn drain<T>(items: &Mutex<Vec<T>>) -> Vec<T> {
    match items.lock() {
        Ok(mut items) => std::mem::take(&mut *items),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    }
}

/// Report host driven by tokio timers
///
/// Every registration gets its own task. The first run happens one interval
/// after registration, and each run is spawned separately so the timer never
/// waits on network I/O.
pub struct MetricsReports {
    handle: Handle,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
    shutdown_hooks: Mutex<Vec<(String, ReportCallback)>>,
}

impl MetricsReports {
    /// Create a host on the current tokio runtime
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| ExportError::Host(format!("No tokio runtime available: {}", e)))?;
        Ok(Self::with_handle(handle))
    }

    /// Create a host spawning onto the given runtime
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(Vec::new()),
            shutdown_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Number of running schedules
    pub fn report_count(&self) -> usize {
        match self.tasks.lock() {
            Ok(tasks) => tasks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Stop all schedules and run shutdown hooks, giving up after `timeout`
    pub async fn shutdown(&self, timeout: Duration) {
        for (name, task) in drain(&self.tasks) {
            debug!("Stopping report: {}", name);
            task.abort();
        }

        let deadline = Instant::now() + timeout;
        for (name, hook) in drain(&self.shutdown_hooks) {
            if tokio::time::timeout_at(deadline, hook()).await.is_err() {
                warn!(
                    "Shutdown of report {} did not finish within {:?}",
                    name, timeout
                );
            }
        }
    }
}

impl ReportHost for MetricsReports {
    fn register_periodic(
        &self,
        name: &str,
        interval: Duration,
        callback: ReportCallback,
    ) -> Result<()> {
        if interval.is_zero() {
            return Err(ExportError::ConfigurationInvalid(
                "report interval must be greater than zero".to_string(),
            ));
        }
        let first_run = Instant::now().checked_add(interval).ok_or_else(|| {
            ExportError::ConfigurationInvalid(format!(
                "report interval {:?} is out of range",
                interval
            ))
        })?;

        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| ExportError::Host("Lock poisoned".to_string()))?;

        let task_name = name.to_string();
        let runtime = self.handle.clone();
        let task = self.handle.spawn(async move {
            let mut timer = tokio::time::interval_at(first_run, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;
                trace!("Running report: {}", task_name);
                runtime.spawn(callback());
            }
        });

        info!("Scheduled report {} every {:?}", name, interval);
        tasks.push((name.to_string(), task));
        Ok(())
    }

    fn register_shutdown(&self, name: &str, hook: ReportCallback) -> Result<()> {
        let mut hooks = self
            .shutdown_hooks
            .lock()
            .map_err(|_| ExportError::Host("Lock poisoned".to_string()))?;
        hooks.push((name.to_string(), hook));
        Ok(())
    }
}

impl Drop for MetricsReports {
    fn drop(&mut self) {
        for (_, task) in drain(&self.tasks) {
            task.abort();
        }
    }
}

/// Lifecycle of a report binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Created but not yet scheduled
    Unbound,
    /// Scheduled on a host; stays this way until the host goes away
    Bound,
}

/// Result of one export tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The batch of this many samples was delivered
    Delivered(usize),
    /// The source had nothing to export
    Empty,
    /// A previous send for this binding was still running
    Skipped,
    /// The batch was dropped
    Failed(DeliveryErrorKind),
}

struct ReportTask {
    sender: tokio::sync::Mutex<Box<dyn Sender>>,
    source: Arc<dyn SampleSource>,
    target: Target,
}

impl ReportTask {
    async fn tick(&self) -> TickOutcome {
        // At most one send per sender; an overlapping tick is dropped.
        let Ok(mut sender) = self.sender.try_lock() else {
            debug!(
                "Previous send to {} still in flight, skipping tick",
                self.target
            );
            return TickOutcome::Skipped;
        };

        let batch = self.source.snapshot();
        if batch.is_empty() {
            trace!("No samples to send to {}", self.target);
            return TickOutcome::Empty;
        }

        let result = match sender.send(&batch).await {
            Ok(()) => sender.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                trace!("Sent {} samples to {}", batch.len(), self.target);
                TickOutcome::Delivered(batch.len())
            }
            Err(e) => {
                warn!("Dropping batch of {} samples: {}", batch.len(), e);
                TickOutcome::Failed(e.kind)
            }
        }
    }

    async fn shutdown(&self) {
        let mut sender = self.sender.lock().await;
        if let Err(e) = sender.flush().await {
            warn!("Final flush to {} failed: {}", self.target, e);
        }
        sender.close().await;
    }
}

/// A sender tied to a sample source and an export interval
pub struct ReportBinding {
    name: String,
    scheme: Scheme,
    interval: Duration,
    state: BindingState,
    task: Arc<ReportTask>,
}

impl ReportBinding {
    pub fn new(sender: Box<dyn Sender>, interval: Duration, source: Arc<dyn SampleSource>) -> Self {
        let scheme = sender.scheme();
        let target = sender.target().clone();

        Self {
            name: format!("graphite {}://{}", scheme, target),
            scheme,
            interval,
            state: BindingState::Unbound,
            task: Arc::new(ReportTask {
                sender: tokio::sync::Mutex::new(sender),
                source,
                target,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn target(&self) -> &Target {
        &self.task.target
    }

    /// Schedule this binding on a host
    ///
    /// A binding can be scheduled once; there is no way back to `Unbound`.
    pub fn bind(&mut self, host: &dyn ReportHost) -> Result<()> {
        if self.state == BindingState::Bound {
            return Err(ExportError::AlreadyBound);
        }

        let task = Arc::clone(&self.task);
        host.register_shutdown(
            &self.name,
            Arc::new(move || -> ReportFuture {
                let task = Arc::clone(&task);
                Box::pin(async move { task.shutdown().await })
            }),
        )?;

        let task = Arc::clone(&self.task);
        host.register_periodic(
            &self.name,
            self.interval,
            Arc::new(move || -> ReportFuture {
                let task = Arc::clone(&task);
                Box::pin(async move {
                    task.tick().await;
                })
            }),
        )?;

        self.state = BindingState::Bound;
        Ok(())
    }

    /// Run one export tick now
    pub async fn tick(&self) -> TickOutcome {
        self.task.tick().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Host that records registrations so tests can fire them by hand
    #[derive(Default)]
    pub struct RecordingHost {
        pub periodic: Mutex<Vec<(String, Duration, ReportCallback)>>,
        pub hooks: Mutex<Vec<ReportCallback>>,
    }

    impl RecordingHost {
        pub fn registrations(&self) -> Vec<(String, Duration)> {
            self.periodic
                .lock()
                .unwrap()
                .iter()
                .map(|(name, interval, _)| (name.clone(), *interval))
                .collect()
        }

        pub async fn fire(&self, index: usize) {
            let callback = Arc::clone(&self.periodic.lock().unwrap()[index].2);
            callback().await;
        }
    }

    impl ReportHost for RecordingHost {
        fn register_periodic(
            &self,
            name: &str,
            interval: Duration,
            callback: ReportCallback,
        ) -> Result<()> {
            self.periodic
                .lock()
                .unwrap()
                .push((name.to_string(), interval, callback));
            Ok(())
        }

        fn register_shutdown(&self, _name: &str, hook: ReportCallback) -> Result<()> {
            self.hooks.lock().unwrap().push(hook);
            Ok(())
        }
    }
}
