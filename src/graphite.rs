//! Convenience methods for scheduling Graphite reports on any host

use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SenderOptions;
use crate::endpoint::{EndpointDescriptor, Scheme};
use crate::error::Result;
use crate::report::{ReportBinding, ReportHost};
use crate::sample::SampleSource;
use crate::sender::{Sender, TransportResolver};

/// Graphite scheduling helpers, available on every `ReportHost`
pub trait GraphiteReports: ReportHost + Sized {
    /// Schedule a report to the endpoint named by `uri`
    fn with_graphite(
        &self,
        uri: &str,
        interval: Duration,
        source: Arc<dyn SampleSource>,
    ) -> Result<ReportBinding> {
        let (endpoint, sender) = TransportResolver::default().resolve_uri(uri, interval)?;
        debug!("Resolved {} to {} sender", uri, endpoint.scheme());
        self.with_graphite_sender(sender, interval, source)
    }

    fn with_tcp_graphite(
        &self,
        host: &str,
        port: u16,
        interval: Duration,
        source: Arc<dyn SampleSource>,
    ) -> Result<ReportBinding> {
        self.with_graphite_endpoint(
            EndpointDescriptor::new(Scheme::Tcp, host, port, interval)?,
            SenderOptions::default(),
            source,
        )
    }

    fn with_udp_graphite(
        &self,
        host: &str,
        port: u16,
        interval: Duration,
        source: Arc<dyn SampleSource>,
    ) -> Result<ReportBinding> {
        self.with_graphite_endpoint(
            EndpointDescriptor::new(Scheme::Udp, host, port, interval)?,
            SenderOptions::default(),
            source,
        )
    }

    fn with_pickled_graphite(
        &self,
        host: &str,
        port: u16,
        interval: Duration,
        batch_size: usize,
        source: Arc<dyn SampleSource>,
    ) -> Result<ReportBinding> {
        let options = SenderOptions {
            batch_size,
            ..SenderOptions::default()
        };
        self.with_graphite_endpoint(
            EndpointDescriptor::new(Scheme::Pickled, host, port, interval)?,
            options,
            source,
        )
    }

    /// Schedule a report for a validated endpoint with explicit sender options
    fn with_graphite_endpoint(
        &self,
        endpoint: EndpointDescriptor,
        options: SenderOptions,
        source: Arc<dyn SampleSource>,
    ) -> Result<ReportBinding> {
        let sender = TransportResolver::new(options).resolve(&endpoint);
        self.with_graphite_sender(sender, endpoint.interval(), source)
    }

    /// Schedule a report through a caller-built sender
    fn with_graphite_sender(
        &self,
        sender: Box<dyn Sender>,
        interval: Duration,
        source: Arc<dyn SampleSource>,
    ) -> Result<ReportBinding> {
        let mut binding = ReportBinding::new(sender, interval, source);
        binding.bind(self)?;
        Ok(binding)
    }
}

impl<H: ReportHost> GraphiteReports for H {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::report::testing::RecordingHost;
    use crate::report::BindingState;
    use crate::sample::MetricSample;

    fn source() -> Arc<dyn SampleSource> {
        Arc::new(|| vec![MetricSample::new("m", 1.0, 1)])
    }

    #[test]
    fn test_helpers_bind_each_transport() {
        let host = RecordingHost::default();
        let interval = Duration::from_secs(5);

        let tcp = host.with_tcp_graphite("graphite", 2003, interval, source()).unwrap();
        let udp = host.with_udp_graphite("graphite", 2003, interval, source()).unwrap();
        let pickled = host
            .with_pickled_graphite("graphite", 2004, interval, 50, source())
            .unwrap();
        let by_uri = host
            .with_graphite("net.pickled://graphite:2004", interval, source())
            .unwrap();

        assert_eq!(tcp.scheme(), Scheme::Tcp);
        assert_eq!(udp.scheme(), Scheme::Udp);
        assert_eq!(pickled.scheme(), Scheme::Pickled);
        assert_eq!(by_uri.scheme(), Scheme::Pickled);
        assert!(
            [&tcp, &udp, &pickled, &by_uri]
                .iter()
                .all(|b| b.state() == BindingState::Bound)
        );
        assert_eq!(host.registrations().len(), 4);
    }

    #[test]
    fn test_unknown_scheme_is_rejected_before_binding() {
        let host = RecordingHost::default();
        let result = host.with_graphite("net.http://graphite:80", Duration::from_secs(5), source());
        assert!(matches!(result, Err(ExportError::InvalidEndpoint { .. })));
        assert!(host.registrations().is_empty());
    }
}
