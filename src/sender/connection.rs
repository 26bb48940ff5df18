use log::debug;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::endpoint::Target;
use crate::error::{DeliveryError, DeliveryResult};

/// A lazily established outbound TCP connection
///
/// The stream is opened on first write and dropped on any write failure, so
/// the next write reconnects. A stream the peer has already closed is
/// replaced before writing.
pub(crate) struct TcpConnection {
    target: Target,
    connect_timeout: Duration,
    write_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpConnection {
    pub fn new(target: Target, connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            target,
            connect_timeout,
            write_timeout,
            stream: None,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn open(&self) -> DeliveryResult<TcpStream> {
        debug!("Connecting to {}", self.target);

        match timeout(self.connect_timeout, TcpStream::connect(self.target.socket_addr())).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not set TCP_NODELAY on {}: {}", self.target, e);
                }
                Ok(stream)
            }
            Ok(Err(e)) => Err(DeliveryError::connection(&self.target, e)),
            Err(_) => Err(DeliveryError::timeout(
                &self.target,
                format!("connect did not complete within {:?}", self.connect_timeout),
            )),
        }
    }

    /// Write the whole buffer, connecting first if needed
    pub async fn write_all(&mut self, bytes: &[u8]) -> DeliveryResult<()> {
        let stream = match self.stream.take() {
            Some(stream) if !peer_closed(&stream) => stream,
            Some(_) => {
                debug!("Connection to {} was closed by the peer", self.target);
                self.open().await?
            }
            None => self.open().await?,
        };
        let stream = self.stream.insert(stream);

        let result = timeout(self.write_timeout, stream.write_all(bytes)).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stream = None;
                Err(DeliveryError::connection(&self.target, e))
            }
            Err(_) => {
                self.stream = None;
                Err(DeliveryError::timeout(
                    &self.target,
                    format!("write did not complete within {:?}", self.write_timeout),
                ))
            }
        }
    }

    /// Shut down and drop the stream if one is open
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error shutting down connection to {}: {}", self.target, e);
            }
        }
    }
}

/// Check a cached stream for a close from the other end without blocking
///
/// Graphite receivers never write back, so EOF or a read error means the
/// stream can no longer carry a batch.
fn peer_closed(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match stream.try_read(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
        Err(_) => true,
    }
}
