use crate::payload::{DecodedPayload, JSON_CONTENT_TYPE};
use crate::publishers::{MessageEnvelope, Publish, PublisherError};
use crate::topology::TopologyDescriptor;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

/// Delivery mode: Non-persistent (1) or persistent (2).
const PERSISTENT: u8 = 2;

/// Error returned when a payload could not be forwarded.
#[derive(thiserror::Error, Debug)]
pub enum ForwardError {
    #[error("Failed to serialize the payload as JSON")]
    Serialization(#[source] serde_json::Error),
    #[error("Failed to publish the payload to exchange `{exchange}`")]
    Publish {
        exchange: String,
        #[source]
        source: PublisherError,
    },
}

/// Republishes decoded payloads, durably, to the outbound exchange.
///
/// The forwarder does not retry: a failure is returned to the caller, which decides whether
/// the originating delivery should be requeued.
#[derive(Debug, Clone)]
pub struct Forwarder {
    exchange_name: String,
    routing_key: String,
}

impl Forwarder {
    pub fn new(exchange_name: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Forward to the exchange of `outbound`, using its routing key.
    pub fn to_topology(outbound: &TopologyDescriptor) -> Self {
        Self::new(&outbound.exchange, &outbound.routing_key)
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Build the envelope that [`Forwarder::forward`] would publish for `payload`.
    pub fn envelope(&self, payload: &DecodedPayload) -> Result<MessageEnvelope, ForwardError> {
        let body = payload
            .to_json_bytes()
            .map_err(ForwardError::Serialization)?;

        let envelope = MessageEnvelope::new(&self.exchange_name, &self.routing_key)
            .with_payload(body)
            .with_content_type(JSON_CONTENT_TYPE.into())
            .with_delivery_mode(PERSISTENT)
            .with_message_id(Uuid::new_v4().to_string().into());

        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(now) => Ok(envelope.with_timestamp(now.as_secs())),
            Err(_) => {
                warn!("System time is before 1970");
                Ok(envelope)
            }
        }
    }

    /// Serialize `payload` and publish it to the outbound exchange.
    pub async fn forward<P>(&self, publisher: &P, payload: &DecodedPayload) -> Result<(), ForwardError>
    where
        P: Publish + ?Sized,
    {
        let envelope = self.envelope(payload)?;
        publisher
            .publish(envelope)
            .await
            .map_err(|source| ForwardError::Publish {
                exchange: self.exchange_name.clone(),
                source,
            })
    }
}
