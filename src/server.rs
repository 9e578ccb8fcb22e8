//! Subscriber channel over TCP.
//!
//! Each connection exchanges newline-delimited JSON events:
//! `{"event": "settings:update", "payload": {...}}`.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::subscribers::{ChannelSink, ClientEvent, SubscriberId, SubscriberRegistry};

/// Pause after a failed accept, e.g. while the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct SubscriberServer {
    listener: TcpListener,
    registry: Arc<SubscriberRegistry>,
    next_id: AtomicU64,
}

impl SubscriberServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: &str, registry: Arc<SubscriberRegistry>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            registry,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts subscribers until the task is cancelled.
    ///
    /// Failed accepts are logged and retried; they never end the loop.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listening address cannot be read.
    pub async fn run(self) -> Result<()> {
        info!("Accepting subscribers on {}", self.local_addr()?);

        loop {
            let accepted = self.listener.accept().await;
            self.handle_accept(accepted).await;
        }
    }

    async fn handle_accept(&self, accepted: io::Result<(TcpStream, SocketAddr)>) {
        match accepted {
            Ok((stream, peer)) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                debug!("Subscriber {id} connected from {peer}");

                tokio::spawn(serve_subscriber(stream, id, Arc::clone(&self.registry)));
            }
            Err(e) => {
                warn!("Failed to accept subscriber: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn serve_subscriber(stream: TcpStream, id: SubscriberId, registry: Arc<SubscriberRegistry>) {
    let (read_half, mut write_half) = stream.into_split();
    let (sink, mut events) = ChannelSink::new(id);

    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let mut line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to encode {} for subscriber {id}: {e}", event.name());
                    continue;
                }
            };
            line.push('\n');

            if let Err(e) = write_half.write_all(line.as_bytes()).await {
                warn!("Subscriber {id} transport error: {e}");
                writer_registry.unregister(id);
                break;
            }
        }
    });

    if registry.register(Arc::new(sink)) {
        debug!("{} subscribers connected", registry.len());
    }

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ClientEvent>(&line) {
                    Ok(event) => registry.handle_client_event(id, event),
                    Err(e) => warn!("Ignoring malformed event from subscriber {id}: {e}"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Subscriber {id} transport error: {e}");
                break;
            }
        }
    }

    // Dropping the registered sink closes the writer's channel.
    registry.unregister(id);
    if let Err(e) = writer.await {
        debug!("Writer for subscriber {id} ended abnormally: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorState;
    use crate::settings::{MemoryStore, Settings, SettingsStore};
    use crate::subscribers::Event;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::OwnedReadHalf;

    async fn next_event(lines: &mut tokio::io::Lines<BufReader<OwnedReadHalf>>) -> Event {
        let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .expect("connection closed");
        serde_json::from_str(&line).unwrap()
    }

    async fn bind_server() -> (SubscriberServer, Arc<SubscriberRegistry>) {
        let state = Arc::new(MonitorState::default());
        state.set_pipeline_names(vec!["build".to_string()]);
        let settings = Arc::new(SettingsStore::new(Box::new(MemoryStore::default())));
        let registry = Arc::new(SubscriberRegistry::new(settings, state));

        let server = SubscriberServer::bind("127.0.0.1:0", Arc::clone(&registry))
            .await
            .unwrap();
        (server, registry)
    }

    async fn start_server() -> (SocketAddr, Arc<SubscriberRegistry>) {
        let (server, registry) = bind_server().await;
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        (addr, registry)
    }

    #[tokio::test]
    async fn test_failed_accept_does_not_stop_serving() {
        let (server, registry) = bind_server().await;
        let addr = server.local_addr().unwrap();

        server
            .handle_accept(Err(io::Error::from(io::ErrorKind::ConnectionAborted)))
            .await;
        server
            .handle_accept(Err(io::Error::other("too many open files")))
            .await;
        assert!(registry.is_empty());

        let run = tokio::spawn(server.run());
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, _write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        assert_eq!(next_event(&mut lines).await, Event::PipelinesUpdated(vec![]));
        assert_eq!(registry.len(), 1);
        assert!(!run.is_finished());
        run.abort();
    }

    #[tokio::test]
    async fn test_subscriber_session() {
        let (addr, registry) = start_server().await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        assert_eq!(next_event(&mut lines).await, Event::PipelinesUpdated(vec![]));
        assert_eq!(
            next_event(&mut lines).await,
            Event::SettingsUpdated(Settings::default())
        );

        write_half
            .write_all(b"{\"event\":\"pipelines:get\"}\n")
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut lines).await,
            Event::PipelinesNames(vec!["build".to_string()])
        );

        write_half.write_all(b"garbage\n").await.unwrap();
        write_half
            .write_all(b"{\"event\":\"settings:update\",\"payload\":{\"darkTheme\":true}}\n")
            .await
            .unwrap();

        let expected = Settings {
            dark_theme: true,
            ..Settings::default()
        };
        assert_eq!(next_event(&mut lines).await, Event::SettingsUpdated(expected.clone()));
        assert_eq!(registry.current_settings(), expected);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_subscriber() {
        let (addr, registry) = start_server().await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        next_event(&mut lines).await;
        assert_eq!(registry.len(), 1);

        drop(write_half);
        drop(lines);

        for _ in 0..50 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(registry.is_empty());
    }
}
