use crate::topology::TopologyDescriptor;
use amq_protocol_types::FieldTable;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::Channel;

#[async_trait::async_trait]
/// The broker operations required to set up a [`TopologyDescriptor`].
///
/// Implemented for [`lapin::Channel`]; the indirection lets the provisioning sequence run
/// against something other than a live broker.
pub trait TopologyChannel: Send + Sync {
    /// Actively declare the exchange described by `descriptor`.
    ///
    /// Succeeds if the exchange already exists with the same properties.
    async fn declare_exchange(&self, descriptor: &TopologyDescriptor) -> Result<(), anyhow::Error>;

    /// Declare the queue described by `descriptor`.
    async fn declare_queue(&self, descriptor: &TopologyDescriptor) -> Result<(), anyhow::Error>;

    /// Bind the queue to the exchange using the descriptor's routing key.
    async fn bind_queue(&self, descriptor: &TopologyDescriptor) -> Result<(), anyhow::Error>;
}

#[async_trait::async_trait]
impl TopologyChannel for Channel {
    async fn declare_exchange(&self, descriptor: &TopologyDescriptor) -> Result<(), anyhow::Error> {
        self.exchange_declare(
            &descriptor.exchange,
            descriptor.kind.into(),
            ExchangeDeclareOptions {
                passive: false,
                durable: descriptor.durable,
                auto_delete: false,
                internal: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await?;
        Ok(())
    }

    async fn declare_queue(&self, descriptor: &TopologyDescriptor) -> Result<(), anyhow::Error> {
        self.queue_declare(
            &descriptor.queue,
            QueueDeclareOptions {
                passive: false,
                durable: descriptor.durable,
                exclusive: false,
                auto_delete: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await?;
        Ok(())
    }

    async fn bind_queue(&self, descriptor: &TopologyDescriptor) -> Result<(), anyhow::Error> {
        self.queue_bind(
            &descriptor.queue,
            &descriptor.exchange,
            &descriptor.routing_key,
            QueueBindOptions { nowait: false },
            FieldTable::default(),
        )
        .await?;
        Ok(())
    }
}

/// The provisioning step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    DeclareExchange,
    DeclareQueue,
    BindQueue,
}

impl std::fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeclareExchange => write!(f, "declare exchange"),
            Self::DeclareQueue => write!(f, "declare queue"),
            Self::BindQueue => write!(f, "bind queue"),
        }
    }
}

/// The broker topology could not be established.
///
/// Returned when the broker is unreachable or when an entity already exists with properties
/// that do not match the descriptor (e.g. an exchange of a different kind).
#[derive(thiserror::Error, Debug)]
#[error("Failed to {step} (exchange `{exchange}`, queue `{queue}`)")]
pub struct ProvisionError {
    pub step: ProvisionStep,
    pub exchange: String,
    pub queue: String,
    #[source]
    pub source: anyhow::Error,
}

impl ProvisionError {
    fn new(step: ProvisionStep, descriptor: &TopologyDescriptor, source: anyhow::Error) -> Self {
        Self {
            step,
            exchange: descriptor.exchange.clone(),
            queue: descriptor.queue.clone(),
            source,
        }
    }
}

/// Make sure every exchange, queue and binding in `descriptors` exists.
///
/// Descriptors are processed in order; for each one the exchange is declared, then the queue,
/// then the binding. Declarations are idempotent, so this is safe to run on every start.
/// The first failure aborts provisioning.
#[tracing::instrument(name = "provision_topology", skip_all)]
pub async fn ensure<C>(channel: &C, descriptors: &[TopologyDescriptor]) -> Result<(), ProvisionError>
where
    C: TopologyChannel + ?Sized,
{
    for descriptor in descriptors {
        channel
            .declare_exchange(descriptor)
            .await
            .map_err(|e| ProvisionError::new(ProvisionStep::DeclareExchange, descriptor, e))?;
        channel
            .declare_queue(descriptor)
            .await
            .map_err(|e| ProvisionError::new(ProvisionStep::DeclareQueue, descriptor, e))?;
        channel
            .bind_queue(descriptor)
            .await
            .map_err(|e| ProvisionError::new(ProvisionStep::BindQueue, descriptor, e))?;
        tracing::info!(
            exchange = %descriptor.exchange,
            queue = %descriptor.queue,
            routing_key = %descriptor.routing_key,
            "Topology ready"
        );
    }
    Ok(())
}
