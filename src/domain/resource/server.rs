use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::domain::resource::codec::ResourceCodec;
use crate::domain::resource::registry::ResourceRegistry;
use crate::error::Result;

/// Collector side of the remote sample channel. Every decoded batch goes to
/// [`ResourceRegistry::receive`].
pub struct ResourceServer {
    listener: TcpListener,
    registry: Arc<ResourceRegistry>,
}

impl ResourceServer {
    pub async fn bind(addr: impl ToSocketAddrs, registry: Arc<ResourceRegistry>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(ResourceServer { listener, registry })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts reporters until `cancel` fires, then waits for open connections to finish.
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        let mut connections = JoinSet::new();
        tracing::info!(addr = ?self.listener.local_addr().ok(), "resource receiver listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "reporter connected");
                        connections.spawn(handle_connection(stream, peer, Arc::clone(&self.registry), cancel.clone()));
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept reporter connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}
        tracing::info!("resource receiver stopped");
        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, registry: Arc<ResourceRegistry>, cancel: CancellationToken) {
    let mut frames = FramedRead::new(stream, ResourceCodec::new());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => match frame {
                Some(Ok(batch)) => {
                    let routed = registry.receive(batch);
                    tracing::debug!(%peer, samples = routed, "batch received");
                }
                Some(Err(e)) => {
                    tracing::warn!(%peer, error = %e, "dropping reporter connection after bad frame");
                    break;
                }
                None => break,
            },
        }
    }

    tracing::debug!(%peer, "reporter disconnected");
}
