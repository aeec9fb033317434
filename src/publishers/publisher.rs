use crate::publishers::MessageEnvelope;
use lapin::message::BasicReturnMessage;
use lapin::options::BasicPublishOptions;
use lapin::publisher_confirm::Confirmation;
use lapin::Channel;

/// Reply code 312 - NO_ROUTE.
/// See <https://www.rabbitmq.com/amqp-0-9-1-reference.html>
const NO_ROUTE: u16 = 312;

#[async_trait::async_trait]
/// Something that can hand a [`MessageEnvelope`] over to the broker.
///
/// The [`Forwarder`](super::Forwarder) publishes through this trait, so that the relay does not
/// care whether it is talking to a real AMQP channel.
pub trait Publish: Send + Sync {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), PublisherError>;
}

/// Error returned when trying to publish a message.
#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error("Generic error encountered when interacting with the RabbitMq broker")]
    GenericError(#[source] anyhow::Error),
    #[error("The timeout threshold was reached while trying to publish the message")]
    TimeoutError,
    #[error("The message could not be routed: {0:?}")]
    UnroutableMessage(Box<BasicReturnMessage>),
    #[error("The RabbitMq broker nacked the publishing of the message: {0:?}")]
    NegativeAck(Option<Box<BasicReturnMessage>>),
}

/// Publishes on an open AMQP channel.
///
/// If publisher confirmations have been enabled on the channel (see
/// [`ChannelPublisher::with_publisher_confirms`]) every publish waits for the broker to
/// confirm it, and messages are published with the `mandatory` flag so that unroutable
/// messages are reported instead of being dropped.
#[derive(Clone)]
pub struct ChannelPublisher {
    channel: Channel,
    publisher_confirms: bool,
    timeout: Option<std::time::Duration>,
}

impl ChannelPublisher {
    /// Publish on `channel` without waiting for confirmations.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            publisher_confirms: false,
            timeout: None,
        }
    }

    /// Declare that `confirm_select` has been issued on the channel.
    #[must_use]
    pub fn with_publisher_confirms(mut self, publisher_confirms: bool) -> Self {
        self.publisher_confirms = publisher_confirms;
        self
    }

    /// Give up on a publish (and its confirmation) after `timeout`.
    /// Publishing waits indefinitely if left unspecified.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl Publish for ChannelPublisher {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), PublisherError> {
        let options = BasicPublishOptions {
            mandatory: self.publisher_confirms,
            // The immediate flag was dropped in RabbitMQ 3.0 - see https://www.rabbitmq.com/blog/2012/11/19/breaking-things-with-rabbitmq-3-0/
            // Setting `true` will cause a not-supported error
            immediate: false,
        };
        let publish_future = publish(&self.channel, options, envelope);
        match self.timeout {
            None => publish_future.await,
            Some(timeout) => match tokio::time::timeout(timeout, publish_future).await {
                Ok(result) => result,
                Err(_) => Err(PublisherError::TimeoutError),
            },
        }
    }
}

/// Publish a payload on a RabbitMq exchange, waiting for publisher confirmation from the
/// RabbitMq broker if the channel is in confirm mode.
///
/// The mandatory flag tells the broker how to react if the message cannot be routed to a queue.
/// If this flag is `true`, the broker will return an unroutable message with a Return method.
/// If this flag is `false`, the broker silently drops the message.
#[tracing::instrument(
    level = "debug",
    skip(channel, envelope),
    fields(exchange = %envelope.exchange_name, routing_key = %envelope.routing_key)
)]
async fn publish(
    channel: &Channel,
    options: BasicPublishOptions,
    envelope: MessageEnvelope,
) -> Result<(), PublisherError> {
    let MessageEnvelope {
        payload,
        exchange_name,
        routing_key,
        properties,
    } = envelope;

    let confirm = channel
        .basic_publish(&exchange_name, &routing_key, options, &payload, properties)
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?;

    match confirm {
        Confirmation::Ack(ack) => {
            if let Some(return_message) = ack {
                if return_message.reply_code == NO_ROUTE {
                    return Err(PublisherError::UnroutableMessage(return_message));
                }
            }
            Ok(())
        }
        Confirmation::Nack(nack) => Err(PublisherError::NegativeAck(nack)),
        Confirmation::NotRequested => Ok(()),
    }
}
