//! Senders deliver batches of samples to a Graphite endpoint

mod connection;
mod pickled;
mod tcp;
mod udp;

pub use pickled::{DEFAULT_JAR_SIZE, PickledBatchSender};
pub use tcp::TcpLineSender;
pub use udp::{UdpLineSender, pack_datagrams};

use async_trait::async_trait;
use std::time::Duration;

use crate::config::SenderOptions;
use crate::endpoint::{EndpointDescriptor, Scheme, Target};
use crate::error::{DeliveryResult, Result};
use crate::sample::MetricSample;

/// Delivers batches of samples to one fixed remote endpoint
#[async_trait]
pub trait Sender: Send + 'static {
    /// Deliver (or, for buffering senders, enqueue) a batch
    async fn send(&mut self, batch: &[MetricSample]) -> DeliveryResult<()>;

    /// Write anything still buffered
    async fn flush(&mut self) -> DeliveryResult<()> {
        Ok(())
    }

    /// Release any open connection
    async fn close(&mut self) {}

    /// The transport this sender speaks
    fn scheme(&self) -> Scheme;

    /// Where samples are sent
    fn target(&self) -> &Target;
}

/// Build the sender for a scheme
///
/// Adding a transport means adding a `Scheme` variant and one arm here.
pub fn create_sender(scheme: Scheme, target: Target, options: &SenderOptions) -> Box<dyn Sender> {
    match scheme {
        Scheme::Tcp => Box::new(TcpLineSender::new(target, options)),
        Scheme::Udp => Box::new(UdpLineSender::new(target, options)),
        Scheme::Pickled => Box::new(PickledBatchSender::new(target, options)),
    }
}

/// Maps endpoint descriptors to senders
#[derive(Debug, Clone, Default)]
pub struct TransportResolver {
    options: SenderOptions,
}

impl TransportResolver {
    pub fn new(options: SenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SenderOptions {
        &self.options
    }

    /// Create the sender for an already validated endpoint
    pub fn resolve(&self, endpoint: &EndpointDescriptor) -> Box<dyn Sender> {
        create_sender(endpoint.scheme(), endpoint.target().clone(), &self.options)
    }

    /// Parse a URI and create its sender
    pub fn resolve_uri(
        &self,
        uri: &str,
        interval: Duration,
    ) -> Result<(EndpointDescriptor, Box<dyn Sender>)> {
        let endpoint = EndpointDescriptor::parse(uri, interval)?;
        let sender = self.resolve(&endpoint);
        Ok((endpoint, sender))
    }
}
