use async_trait::async_trait;
use log::trace;

use super::Sender;
use super::connection::TcpConnection;
use crate::config::SenderOptions;
use crate::endpoint::{Scheme, Target};
use crate::error::DeliveryResult;
use crate::sample::MetricSample;

/// Sends the plaintext line protocol over one persistent TCP connection
pub struct TcpLineSender {
    connection: TcpConnection,
}

impl TcpLineSender {
    pub fn new(target: Target, options: &SenderOptions) -> Self {
        Self {
            connection: TcpConnection::new(
                target,
                options.connect_timeout(),
                options.write_timeout(),
            ),
        }
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }
}

#[async_trait]
impl Sender for TcpLineSender {
    async fn send(&mut self, batch: &[MetricSample]) -> DeliveryResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let payload: String = batch.iter().map(MetricSample::to_line).collect();
        trace!(
            "Writing {} lines ({} bytes) to {}",
            batch.len(),
            payload.len(),
            self.connection.target()
        );
        self.connection.write_all(payload.as_bytes()).await
    }

    async fn close(&mut self) {
        self.connection.close().await;
    }

    fn scheme(&self) -> Scheme {
        Scheme::Tcp
    }

    fn target(&self) -> &Target {
        self.connection.target()
    }
}
