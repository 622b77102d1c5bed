use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use courier_protocol::{ClientEvent, EventKind, ServerEvent, User};
use futures::{SinkExt, StreamExt};
use snafu::ResultExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::RealtimeLink;
use crate::error::{ChatResult, ConnectionSnafu};

type Subscribers = HashMap<EventKind, Vec<mpsc::UnboundedSender<ServerEvent>>>;

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    handshake_confirmed: AtomicBool,
    subscribers: Mutex<Subscribers>,
}

impl Shared {
    fn dispatch_text(&self, text: &str) {
        let event = match ServerEvent::decode(text) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!("skipping undecodable realtime frame: {error}");
                return;
            }
        };

        if matches!(event, ServerEvent::Connected) {
            self.handshake_confirmed.store(true, Ordering::SeqCst);
            tracing::info!("realtime handshake confirmed");
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(senders) = subscribers.get_mut(&event.kind()) {
            senders.retain(|sender| sender.send(event.clone()).is_ok());
        }
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the senders ends every subscriber stream.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Owns the single realtime connection of a signed-in session.
///
/// A background worker owns the socket. Outbound events reach it through a
/// channel; inbound frames are decoded and fanned out to subscribers by kind.
/// There is no reconnection: once the socket drops, the manager reports
/// disconnected and drops further emits.
pub struct ConnectionManager {
    url: String,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    shared: Arc<Shared>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Connects to `url` and announces `me` with the `setup` handshake.
    pub async fn connect(url: &str, me: &User) -> ChatResult<Self> {
        let (socket, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .context(ConnectionSnafu {
                    stage: "realtime-connect",
                    url: url.to_string(),
                })?;
        tracing::info!(%url, "realtime connection established");

        Ok(Self::from_socket(url, socket, me))
    }

    /// Adopts an already handshaken websocket.
    pub fn from_socket<S>(url: &str, socket: WebSocketStream<S>, me: &User) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::SeqCst);

        let worker = tokio::spawn(drive_socket(
            socket,
            outbound_rx,
            shutdown_rx,
            Arc::clone(&shared),
        ));

        let manager = Self {
            url: url.to_string(),
            outbound: outbound_tx,
            shared,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        };
        manager.emit(ClientEvent::Setup(me.clone()));
        manager
    }

    pub fn is_handshake_confirmed(&self) -> bool {
        self.shared.handshake_confirmed.load(Ordering::SeqCst)
    }

    /// Registers one stream receiving every inbound event of the given kinds.
    pub fn subscribe(&self, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for kind in kinds {
            if !kind.is_inbound() {
                tracing::debug!(?kind, "ignoring subscription to an outbound-only event");
                continue;
            }
            subscribers.entry(*kind).or_default().push(sender.clone());
        }
        receiver
    }

    /// Closes the socket and waits for the worker to finish.
    pub async fn close(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(worker) = self.worker.take()
            && let Err(error) = worker.await
        {
            tracing::warn!("realtime worker ended abnormally: {error}");
        }
        tracing::info!(url = %self.url, "realtime connection closed");
    }
}

impl RealtimeLink for ConnectionManager {
    fn emit(&self, event: ClientEvent) -> bool {
        if !self.is_connected() {
            tracing::debug!(kind = ?event.kind(), "dropping realtime event while disconnected");
            return false;
        }
        self.outbound.send(event).is_ok()
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

async fn drive_socket<S>(
    socket: WebSocketStream<S>,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    mut shutdown: oneshot::Receiver<()>,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
            Some(event) = outbound.recv() => {
                let text = match event.encode() {
                    Ok(text) => text,
                    Err(error) => {
                        tracing::error!(kind = ?event.kind(), "failed to encode realtime event: {error}");
                        continue;
                    }
                };
                if let Err(error) = sink.send(WsMessage::Text(text)).await {
                    tracing::warn!("realtime send failed, closing connection: {error}");
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => shared.dispatch_text(&text),
                Some(Ok(WsMessage::Close(_))) | None => {
                    tracing::info!("realtime connection closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!("realtime connection dropped: {error}");
                    break;
                }
            },
        }
    }

    shared.disconnect();
}
