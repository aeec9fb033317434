use crate::amqp::BasicProperties;
use amq_protocol_types::{ShortShortUInt, ShortString, Timestamp};

/// A message to be published via a [`Publish`](super::Publish) implementation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MessageEnvelope {
    // The body of the message - as a sequence of bytes.
    pub payload: Vec<u8>,
    // The name of the exchange we are publishing the message to.
    pub exchange_name: String,
    // The routing key used by the exchange to route the message to its bound queues.
    pub routing_key: String,
    // AMQP properties attached to the message.
    pub properties: BasicProperties,
}

impl MessageEnvelope {
    pub fn new(exchange_name: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            routing_key: routing_key.into(),
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, value: Vec<u8>) -> Self {
        self.payload = value;
        self
    }

    fn props(mut self, f: impl FnOnce(BasicProperties) -> BasicProperties) -> Self {
        self.properties = f(self.properties);
        self
    }

    pub fn with_content_type(self, value: ShortString) -> Self {
        self.props(|p| p.with_content_type(value))
    }

    pub fn with_delivery_mode(self, value: ShortShortUInt) -> Self {
        self.props(|p| p.with_delivery_mode(value))
    }

    pub fn with_message_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_message_id(value))
    }

    pub fn with_timestamp(self, value: Timestamp) -> Self {
        self.props(|p| p.with_timestamp(value))
    }
}
