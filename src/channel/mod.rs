//! Notification channel: persistent TCP connections that receive every
//! change event as one line of JSON.
//!
//! A single hub task owns the subscriber set and is the only consumer of the
//! event bus. Each connection has its own writer task fed through a bounded
//! queue, so one stuck or broken subscriber never holds up the others; it is
//! simply dropped from the set.

pub mod client;
pub mod wire;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::DEFAULT_SUBSCRIBER_QUEUE;
use crate::event::{ChangeEvent, EventBus};
use wire::WireFormat;

type Frame = Arc<str>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub wire: WireFormat,
    /// Frames buffered per subscriber before it is dropped as too slow.
    pub subscriber_queue: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            wire: WireFormat::default(),
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
        }
    }
}

struct Subscriber {
    id: u64,
    peer: SocketAddr,
    tx: mpsc::Sender<Frame>,
}

/// Running notification channel. Dropping it stops accepting and disconnects
/// every subscriber.
pub struct NotificationChannel {
    local_addr: SocketAddr,
    subscribers: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
    hub_task: JoinHandle<()>,
}

impl NotificationChannel {
    /// Bind `addr` and start serving events published on `bus`.
    pub async fn bind(
        addr: SocketAddr,
        bus: &EventBus,
        options: ChannelOptions,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind notification channel on {addr}"))?;
        Self::serve(listener, bus, options).context("notification channel listener")
    }

    /// Serve on an already bound listener.
    pub fn serve(
        listener: TcpListener,
        bus: &EventBus,
        options: ChannelOptions,
    ) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let subscribers = Arc::new(AtomicUsize::new(0));

        let (join_tx, join_rx) = mpsc::channel::<Subscriber>(64);
        let (leave_tx, leave_rx) = mpsc::unbounded_channel::<u64>();

        let hub_task = tokio::spawn(run_hub(
            bus.subscribe(),
            join_rx,
            leave_rx,
            options.wire,
            Arc::clone(&subscribers),
        ));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            join_tx,
            leave_tx,
            options.subscriber_queue.max(1),
        ));

        tracing::info!(addr = %local_addr, "notification channel listening");
        Ok(Self {
            local_addr,
            subscribers,
            accept_task,
            hub_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribers currently registered with the hub.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.accept_task.abort();
        self.hub_task.abort();
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(
    listener: TcpListener,
    joins: mpsc::Sender<Subscriber>,
    leaves: mpsc::UnboundedSender<u64>,
    queue: usize,
) {
    let mut next_id = 0u64;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                continue;
            }
        };
        next_id += 1;
        let id = next_id;
        let (tx, rx) = mpsc::channel::<Frame>(queue);

        if joins.send(Subscriber { id, peer, tx }).await.is_err() {
            return; // hub gone
        }
        tracing::info!(%peer, id, "subscriber connected");

        let leaves = leaves.clone();
        tokio::spawn(async move {
            serve_subscriber(stream, rx).await;
            tracing::info!(%peer, id, "subscriber disconnected");
            let _ = leaves.send(id);
        });
    }
}

/// Pump frames to one connection until it closes, errors, or the hub drops it.
/// Anything the subscriber sends is read and discarded.
async fn serve_subscriber(stream: TcpStream, mut frames: mpsc::Receiver<Frame>) {
    let (mut reader, mut writer) = stream.into_split();
    let mut discard = [0u8; 1024];

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(err) = writer.write_all(frame.as_bytes()).await {
                    tracing::debug!(error = %err, "subscriber write failed");
                    break;
                }
            }
            read = reader.read(&mut discard) => match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(error = %err, "subscriber read failed");
                    break;
                }
            },
        }
    }
    let _ = writer.shutdown().await;
}

async fn run_hub(
    mut events: broadcast::Receiver<Arc<ChangeEvent>>,
    mut joins: mpsc::Receiver<Subscriber>,
    mut leaves: mpsc::UnboundedReceiver<u64>,
    wire: WireFormat,
    count: Arc<AtomicUsize>,
) {
    let mut subscribers: Vec<Subscriber> = Vec::new();

    loop {
        tokio::select! {
            // Registrations first so a subscriber that is already connected
            // sees the next event.
            biased;

            Some(sub) = joins.recv() => {
                subscribers.push(sub);
            }
            Some(id) = leaves.recv() => {
                subscribers.retain(|s| s.id != id);
            }
            received = events.recv() => match received {
                Ok(event) => {
                    let frame: Frame = match wire.encode(&event) {
                        Ok(line) => line.into(),
                        Err(err) => {
                            tracing::warn!(error = %err, path = event.path(), "cannot encode event");
                            continue;
                        }
                    };
                    fan_out(&mut subscribers, &frame);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "notification hub lagged behind the event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
        count.store(subscribers.len(), Ordering::Relaxed);
    }
}

/// Send `frame` to every subscriber, dropping the ones that cannot take it.
fn fan_out(subscribers: &mut Vec<Subscriber>, frame: &Frame) {
    if subscribers.is_empty() {
        tracing::trace!("no subscribers connected");
        return;
    }

    subscribers.retain(|sub| match sub.tx.try_send(Arc::clone(frame)) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(peer = %sub.peer, id = sub.id, "subscriber too slow; dropping");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(peer = %sub.peer, id = sub.id, "subscriber gone");
            false
        }
    });
    tracing::debug!(count = subscribers.len(), "broadcast to subscribers");
}
