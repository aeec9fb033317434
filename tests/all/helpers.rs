use carrot_relay::amqp::configuration::RabbitMqSettings;
use carrot_relay::amqp::options::{BasicAckOptions, BasicNackOptions};
use carrot_relay::amqp::ConnectionFactory;
use carrot_relay::configuration::RelaySettings;
use carrot_relay::consumers::{Acknowledge, Delivery};
use carrot_relay::publishers::{MessageEnvelope, Publish, PublisherError};
use carrot_relay::topology::TopologyDescriptor;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Ack(u64),
    Nack { tag: u64, requeue: bool },
}

/// Keeps track of every ack/nack sent for the deliveries it creates.
#[derive(Clone, Default)]
pub struct AckLedger(Arc<Mutex<Vec<Settled>>>);

impl AckLedger {
    pub fn entries(&self) -> Vec<Settled> {
        self.0.lock().unwrap().clone()
    }

    pub fn delivery(&self, delivery_tag: u64, data: &[u8]) -> Delivery {
        Delivery::new(
            delivery_tag,
            data.to_vec(),
            LedgerAcker {
                delivery_tag,
                ledger: self.clone(),
            },
        )
        .routed_from("messaging", "messaging.execute")
    }
}

struct LedgerAcker {
    delivery_tag: u64,
    ledger: AckLedger,
}

#[async_trait::async_trait]
impl Acknowledge for LedgerAcker {
    async fn ack(&self, _options: BasicAckOptions) -> Result<(), anyhow::Error> {
        self.ledger
            .0
            .lock()
            .unwrap()
            .push(Settled::Ack(self.delivery_tag));
        Ok(())
    }

    async fn nack(&self, options: BasicNackOptions) -> Result<(), anyhow::Error> {
        self.ledger.0.lock().unwrap().push(Settled::Nack {
            tag: self.delivery_tag,
            requeue: options.requeue,
        });
        Ok(())
    }
}

/// Captures published envelopes, or fails every publish like a closed channel would.
#[derive(Clone, Default)]
pub struct InMemoryPublisher {
    pub closed: bool,
    pub published: Arc<Mutex<Vec<MessageEnvelope>>>,
}

impl InMemoryPublisher {
    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<MessageEnvelope> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Publish for InMemoryPublisher {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), PublisherError> {
        if self.closed {
            return Err(PublisherError::GenericError(anyhow::anyhow!(
                "invalid channel state: Closed"
            )));
        }
        self.published.lock().unwrap().push(envelope);
        Ok(())
    }
}

pub fn get_rabbitmq_settings() -> RabbitMqSettings {
    RabbitMqSettings::default()
}

pub fn get_connection_factory() -> ConnectionFactory {
    ConnectionFactory::new_from_config(&get_rabbitmq_settings()).unwrap()
}

/// Relay settings pointing at a freshly named pair of topologies, so tests do not interfere
/// with each other.
pub fn get_isolated_relay_settings() -> RelaySettings {
    let suffix = Uuid::new_v4().to_string();
    RelaySettings {
        rabbitmq: get_rabbitmq_settings(),
        inbound: TopologyDescriptor::direct(
            format!("inbound-{suffix}"),
            format!("inbound-queue-{suffix}"),
            "messaging.execute",
        ),
        outbound: TopologyDescriptor::direct(
            format!("outbound-{suffix}"),
            format!("outbound-queue-{suffix}"),
            "consumer.execute",
        ),
        ..RelaySettings::default()
    }
}
