//! The notify server.
//!
//! Subscribers connect and are added to the subscriber set; a single
//! fan-out task drains the notify queue and broadcasts each
//! notification to every live subscriber. A subscriber whose write
//! fails is pruned at the end of that same broadcast pass.

use std::{net::SocketAddr, sync::Arc};

use futures::SinkExt;
use tokio::{
    net::{tcp::OwnedWriteHalf, TcpListener},
    sync::{mpsc, Mutex},
};
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{framing::JsonLinesCodec, protocol::Notification};

struct Subscriber {
    peer: SocketAddr,
    sink: FramedWrite<OwnedWriteHalf, JsonLinesCodec>,
}

/// A subscriber is a member exactly as long as none of its writes have
/// failed. Guarded by a lock shared between the accept loop and the
/// fan-out task.
type SubscriberSet = Arc<Mutex<Vec<Subscriber>>>;

pub(crate) async fn run(
    listener: TcpListener,
    notifications: mpsc::UnboundedReceiver<Notification>,
) {
    let subscribers = SubscriberSet::default();

    tokio::spawn(
        fan_out(notifications, Arc::clone(&subscribers)).instrument(info_span!("Fan-out")),
    );

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(%peer, "Subscriber connected");

                // Subscribers never send us anything; only the write
                // half is kept.
                let (_, write_half) = stream.into_split();

                subscribers.lock().await.push(Subscriber {
                    peer,
                    sink: FramedWrite::new(write_half, JsonLinesCodec::new()),
                });
            }
            Err(e) => warn!(%e, "Could not accept subscriber"),
        }
    }
}

async fn fan_out(
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    subscribers: SubscriberSet,
) {
    while let Some(notification) = notifications.recv().await {
        // The lock is held across the whole pass: membership stays
        // consistent with who actually saw this notification, and a
        // subscriber arriving mid-broadcast waits for the next one.
        let mut subscribers = subscribers.lock().await;

        debug!(count = subscribers.len(), "Broadcasting");

        let mut broken = Vec::new();
        for (index, subscriber) in subscribers.iter_mut().enumerate() {
            if let Err(e) = subscriber.sink.send(&notification).await {
                debug!(peer = %subscriber.peer, %e, "Write to subscriber failed");
                broken.push(index);
            }
        }

        for index in broken.into_iter().rev() {
            let subscriber = subscribers.remove(index);
            info!(peer = %subscriber.peer, "Removing subscriber");
        }
    }

    debug!("Notify queue closed, fan-out stopping");
}
