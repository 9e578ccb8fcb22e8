use tokio::sync::mpsc;

use super::event::Event;

pub type SubscriberId = u64;

/// Send half of one connected subscriber.
pub trait Sink: Send + Sync {
    fn id(&self) -> SubscriberId;

    /// Best-effort delivery; returns `false` once the subscriber is gone.
    fn send(&self, event: Event) -> bool;
}

/// Sink backed by an unbounded channel drained by the connection's writer.
pub struct ChannelSink {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new(id: SubscriberId) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }
}
