use async_trait::async_trait;
use log::trace;

use super::Sender;
use super::connection::TcpConnection;
use crate::config::SenderOptions;
use crate::endpoint::{Scheme, Target};
use crate::error::{DeliveryError, DeliveryResult};
use crate::pickle::encode_frame;
use crate::sample::MetricSample;

/// Default number of samples per pickle frame
pub const DEFAULT_JAR_SIZE: usize = 100;

/// Sends batches as length-prefixed pickle frames over TCP
///
/// Samples accumulate in a jar that is written as one frame whenever it
/// reaches `batch_size`, and on `flush`. The jar is emptied whether or not
/// the write succeeds.
pub struct PickledBatchSender {
    connection: TcpConnection,
    batch_size: usize,
    jar: Vec<MetricSample>,
}

impl PickledBatchSender {
    pub fn new(target: Target, options: &SenderOptions) -> Self {
        let batch_size = options.batch_size.max(1);
        Self {
            connection: TcpConnection::new(
                target,
                options.connect_timeout(),
                options.write_timeout(),
            ),
            batch_size,
            jar: Vec::with_capacity(batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Samples waiting for the next frame
    pub fn buffered(&self) -> usize {
        self.jar.len()
    }

    async fn write_jar(&mut self) -> DeliveryResult<()> {
        if self.jar.is_empty() {
            return Ok(());
        }

        let count = self.jar.len();
        let frame = encode_frame(&self.jar);
        self.jar.clear();

        let frame = frame
            .map_err(|e| DeliveryError::serialization(self.connection.target(), e.to_string()))?;
        trace!(
            "Writing pickle frame of {} samples ({} bytes) to {}",
            count,
            frame.len(),
            self.connection.target()
        );
        self.connection.write_all(&frame).await
    }
}

#[async_trait]
impl Sender for PickledBatchSender {
    async fn send(&mut self, batch: &[MetricSample]) -> DeliveryResult<()> {
        for sample in batch {
            self.jar.push(sample.clone());
            if self.jar.len() >= self.batch_size {
                self.write_jar().await?;
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> DeliveryResult<()> {
        self.write_jar().await
    }

    async fn close(&mut self) {
        self.connection.close().await;
    }

    fn scheme(&self) -> Scheme {
        Scheme::Pickled
    }

    fn target(&self) -> &Target {
        self.connection.target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryErrorKind;
    use crate::pickle::reference::decode_frames;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn options(batch_size: usize) -> SenderOptions {
        SenderOptions {
            batch_size,
            ..SenderOptions::default()
        }
    }

    fn samples(n: usize) -> Vec<MetricSample> {
        (0..n)
            .map(|i| MetricSample::new(format!("jar.{}", i), i as f64, 1_700_000_000))
            .collect()
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_frames_split_at_batch_size() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut sender = PickledBatchSender::new(Target::new("127.0.0.1", port), &options(10));
        let input = samples(25);

        sender.send(&input).await.unwrap();
        assert_eq!(sender.buffered(), 5);
        sender.flush().await.unwrap();
        assert_eq!(sender.buffered(), 0);
        sender.close().await;

        let frames = decode_frames(&reader.await.unwrap());
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() <= 10));

        let paths: Vec<_> = frames.into_iter().flatten().map(|(p, _, _)| p).collect();
        let expected: Vec<_> = input.into_iter().map(|s| s.path).collect();
        assert_eq!(paths, expected);
    }

    #[tokio::test]
    async fn test_exact_multiple_leaves_nothing_to_flush() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut sender = PickledBatchSender::new(Target::new("127.0.0.1", port), &options(10));
        sender.send(&samples(20)).await.unwrap();
        assert_eq!(sender.buffered(), 0);
        sender.flush().await.unwrap();
        sender.close().await;

        let frames = decode_frames(&reader.await.unwrap());
        assert_eq!(frames.iter().map(|f| f.len()).collect::<Vec<_>>(), vec![10, 10]);
    }

    #[tokio::test]
    async fn test_flush_with_empty_jar_does_not_connect() {
        let mut sender =
            PickledBatchSender::new(Target::new("127.0.0.1", closed_port()), &options(10));
        assert!(sender.flush().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_flush_clears_jar() {
        let mut sender =
            PickledBatchSender::new(Target::new("127.0.0.1", closed_port()), &options(10));

        sender.send(&samples(4)).await.unwrap();
        assert_eq!(sender.buffered(), 4);

        let err = sender.flush().await.unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Connection);
        assert_eq!(sender.buffered(), 0);
    }

    #[tokio::test]
    async fn test_failed_full_jar_drops_rest_of_batch() {
        let mut sender =
            PickledBatchSender::new(Target::new("127.0.0.1", closed_port()), &options(3));

        assert!(sender.send(&samples(7)).await.is_err());
        assert_eq!(sender.buffered(), 0);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let sender = PickledBatchSender::new(Target::new("localhost", 2004), &options(0));
        assert_eq!(sender.batch_size(), 1);
    }
}
