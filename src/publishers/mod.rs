//! Facilities to publish messages to a RabbitMq exchange. Check out [`Forwarder`] as a starting point.
mod forwarder;
mod message_envelope;
mod publisher;

pub use forwarder::{ForwardError, Forwarder};
pub use message_envelope::MessageEnvelope;
pub use publisher::{ChannelPublisher, Publish, PublisherError};
