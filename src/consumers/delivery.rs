use amq_protocol_types::{DeliveryTag, ShortString};
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::BasicProperties;
use std::fmt;

#[async_trait::async_trait]
/// Settles a delivery with the broker.
///
/// Implemented for [`lapin::acker::Acker`].
pub trait Acknowledge: Send + Sync {
    async fn ack(&self, options: BasicAckOptions) -> Result<(), anyhow::Error>;

    async fn nack(&self, options: BasicNackOptions) -> Result<(), anyhow::Error>;
}

#[async_trait::async_trait]
impl Acknowledge for lapin::acker::Acker {
    async fn ack(&self, options: BasicAckOptions) -> Result<(), anyhow::Error> {
        lapin::acker::Acker::ack(self, options).await?;
        Ok(())
    }

    async fn nack(&self, options: BasicNackOptions) -> Result<(), anyhow::Error> {
        lapin::acker::Acker::nack(self, options).await?;
        Ok(())
    }
}

/// The action we asked the broker to take when finalising the processing of
/// a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerAction {
    /// Positive acknowledgement - the message is removed from the queue.
    Ack,
    /// Negative acknowledgement - the message was not processed successfully and is requeued
    /// to retry processing.
    Nack,
}

impl fmt::Display for BrokerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ack"),
            Self::Nack => write!(f, "nack"),
        }
    }
}

/// The broker could not be told how a delivery was resolved.
#[derive(thiserror::Error, Debug)]
#[error("Failed to {action} delivery {delivery_tag}")]
pub struct ResolutionError {
    pub delivery_tag: DeliveryTag,
    pub action: BrokerAction,
    #[source]
    pub source: anyhow::Error,
}

/// A message received from the inbound queue.
pub struct Delivery {
    /// The delivery tag of the message.
    pub delivery_tag: DeliveryTag,

    /// The exchange of the message. May be an empty string
    /// if the default exchange is used.
    pub exchange: ShortString,

    /// The routing key of the message. May be an empty string
    /// if no routing key is specified.
    pub routing_key: ShortString,

    /// Whether this message was redelivered
    pub redelivered: bool,

    /// Contains the properties and the headers of the
    /// message.
    pub properties: BasicProperties,

    /// The payload of the message in binary format.
    pub data: Vec<u8>,

    // AMQP forbids settling a delivery tag more than once:
    // https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.ack.delivery-tag
    // The acker is only reachable through `resolve`, which consumes the delivery.
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    /// A delivery with no routing context and default properties.
    pub fn new(delivery_tag: DeliveryTag, data: Vec<u8>, acker: impl Acknowledge + 'static) -> Self {
        Self {
            delivery_tag,
            exchange: "".into(),
            routing_key: "".into(),
            redelivered: false,
            properties: BasicProperties::default(),
            data,
            acker: Box::new(acker),
        }
    }

    #[must_use]
    pub fn routed_from(mut self, exchange: &str, routing_key: &str) -> Self {
        self.exchange = exchange.into();
        self.routing_key = routing_key.into();
        self
    }

    #[must_use]
    pub fn redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    /// Settle the delivery with the broker.
    ///
    /// A nack always asks the broker to requeue the message.
    pub(crate) async fn resolve(self, action: BrokerAction) -> Result<(), ResolutionError> {
        let result = match action {
            BrokerAction::Ack => self.acker.ack(BasicAckOptions { multiple: false }).await,
            BrokerAction::Nack => {
                self.acker
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue: true,
                    })
                    .await
            }
        };
        result.map_err(|source| ResolutionError {
            delivery_tag: self.delivery_tag,
            action,
            source,
        })
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("redelivered", &self.redelivered)
            .field("properties", &self.properties)
            .field("data_len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: value.delivery_tag,
            exchange: value.exchange,
            routing_key: value.routing_key,
            redelivered: value.redelivered,
            properties: value.properties,
            data: value.data,
            acker: Box::new(value.acker),
        }
    }
}
