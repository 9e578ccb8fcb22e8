mod event;
mod registry;
mod sink;

pub use event::{ClientEvent, Event};
pub use registry::SubscriberRegistry;
pub use sink::{ChannelSink, SubscriberId};

/// Fan-out of events to whoever is currently listening.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, event: Event);
}
