use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

use crate::api::resource_dto::ResourceCollectionDto;
use crate::domain::resource::codec::ResourceCodec;
use crate::domain::sampler::MetricSampler;
use crate::error::Result;

/// Worker side of the remote sample channel: periodically ships what the local sampler gathered.
pub struct ResourceReporter<T = TcpStream> {
    sink: FramedWrite<T, ResourceCodec>,
}

impl ResourceReporter<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }
}

impl<T> ResourceReporter<T>
where
    T: AsyncWrite + Unpin,
{
    pub fn from_stream(stream: T) -> Self {
        ResourceReporter { sink: FramedWrite::new(stream, ResourceCodec::new()) }
    }

    pub async fn send(&mut self, batch: ResourceCollectionDto) -> Result<()> {
        self.sink.send(batch).await?;
        Ok(())
    }

    /// Drains the sampler and sends its samples as one batch. Nothing is sent when it was empty.
    ///
    /// If sending fails the samples go back into the sampler, so the next flush retries them.
    pub async fn flush_from(&mut self, sampler: &MetricSampler) -> Result<usize> {
        let samples = sampler.get_and_clear();
        let count = samples.len();
        if count == 0 {
            return Ok(0);
        }

        let batch = ResourceCollectionDto::new(samples);
        if let Err(e) = self.send(batch.clone()).await {
            log::warn!("Sending {} samples of {} failed, keeping them for the next flush: {}", count, sampler.source(), e);
            sampler.requeue(batch.samples);
            return Err(e);
        }
        Ok(count)
    }

    /// Flushes every `interval` until `cancel` fires, then flushes one last time.
    pub async fn run(mut self, sampler: &MetricSampler, interval: Duration, cancel: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let sent = self.flush_from(sampler).await?;
                    tracing::debug!(source = %sampler.source(), samples = sent, "flushed samples to collector");
                }
            }
        }

        self.flush_from(sampler).await?;
        self.sink.close().await?;
        Ok(())
    }
}
