use async_trait::async_trait;
use log::trace;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;

use super::Sender;
use crate::config::SenderOptions;
use crate::endpoint::{Scheme, Target};
use crate::error::{DeliveryError, DeliveryResult};
use crate::sample::MetricSample;

/// Sends the plaintext line protocol as UDP datagrams
///
/// Lines are packed into datagrams up to `max_datagram_size` bytes; a line
/// longer than that travels alone. Nothing is kept between sends.
pub struct UdpLineSender {
    target: Target,
    max_datagram_size: usize,
    write_timeout: Duration,
}

impl UdpLineSender {
    pub fn new(target: Target, options: &SenderOptions) -> Self {
        Self {
            target,
            max_datagram_size: options.max_datagram_size.max(1),
            write_timeout: options.write_timeout(),
        }
    }

    async fn deliver(&self, datagrams: &[Vec<u8>]) -> io::Result<()> {
        let addr = lookup_host(self.target.socket_addr())
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
            })?;

        let local = if addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await?;

        for datagram in datagrams {
            socket.send_to(datagram, addr).await?;
        }
        Ok(())
    }
}

/// Pack lines into datagrams no larger than `max_size` bytes where possible
pub fn pack_datagrams(batch: &[MetricSample], max_size: usize) -> Vec<Vec<u8>> {
    let mut datagrams = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for sample in batch {
        let line = sample.to_line();
        if !current.is_empty() && current.len() + line.len() > max_size {
            datagrams.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(line.as_bytes());
    }

    if !current.is_empty() {
        datagrams.push(current);
    }
    datagrams
}

#[async_trait]
impl Sender for UdpLineSender {
    async fn send(&mut self, batch: &[MetricSample]) -> DeliveryResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let datagrams = pack_datagrams(batch, self.max_datagram_size);
        trace!(
            "Sending {} samples in {} datagrams to {}",
            batch.len(),
            datagrams.len(),
            self.target
        );

        match timeout(self.write_timeout, self.deliver(&datagrams)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DeliveryError::connection(&self.target, e)),
            Err(_) => Err(DeliveryError::timeout(
                &self.target,
                format!("send did not complete within {:?}", self.write_timeout),
            )),
        }
    }

    fn scheme(&self) -> Scheme {
        Scheme::Udp
    }

    fn target(&self) -> &Target {
        &self.target
    }
}
