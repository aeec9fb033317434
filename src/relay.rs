//! The relay process: connection ownership, provisioning, subscription and shutdown.
use crate::amqp::options::{
    BasicCancelOptions, BasicConsumeOptions, BasicQosOptions, ConfirmSelectOptions,
};
use crate::amqp::types::FieldTable;
use crate::amqp::{Connection, ConnectionFactory};
use crate::configuration::RelaySettings;
use crate::consumers::{Delivery, DeliveryCoordinator, LogPayload, Processor, RunSummary};
use crate::publishers::{ChannelPublisher, Forwarder};
use crate::topology::{self, ProvisionError};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Reply code sent to the broker when closing the connection.
const REPLY_SUCCESS: u16 = 200;

/// Fatal errors for a relay run.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("Invalid RabbitMq connection settings")]
    Settings(#[source] anyhow::Error),
    #[error("Failed to connect to RabbitMq")]
    Connection(#[source] anyhow::Error),
    #[error("Failed to open a channel on the RabbitMq connection")]
    Channel(#[source] lapin::Error),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("Failed to subscribe to queue `{queue}`")]
    Subscription {
        queue: String,
        #[source]
        source: lapin::Error,
    },
    #[error("Consumption stopped unexpectedly")]
    Consumption(#[source] anyhow::Error),
    #[error("Failed to listen for shutdown signals")]
    Signals(#[source] std::io::Error),
}

/// Relays messages from the inbound queue to the outbound exchange.
///
/// A `Relay` owns the connection to RabbitMq for the whole duration of a run:
///
/// 1. connect and open a channel;
/// 2. provision the inbound and outbound topologies;
/// 3. set the prefetch count and subscribe to the inbound queue;
/// 4. hand every delivery to a [`DeliveryCoordinator`] until shutdown;
/// 5. close the connection.
///
/// Whatever happens after the connection has been opened, it is closed exactly once before
/// the run returns.
pub struct Relay {
    settings: RelaySettings,
    processor: Arc<dyn Processor>,
}

impl Relay {
    /// A relay that logs every payload it forwards.
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            processor: Arc::new(LogPayload),
        }
    }

    /// Replace the processing step run on every payload before it is forwarded.
    #[must_use]
    pub fn with_processor(mut self, processor: impl Processor) -> Self {
        self.processor = Arc::new(processor);
        self
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Run the relay until SIGINT or SIGTERM is received.
    ///
    /// It also returns if the connection with RabbitMq is lost.
    pub async fn run_until_signal(self) -> Result<RunSummary, RelayError> {
        let shutdown = CancellationToken::new();
        let listener = crate::shutdown::listen_for_signals(shutdown.clone())
            .map_err(RelayError::Signals)?;
        let result = self.run_until_shutdown(shutdown).await;
        listener.abort();
        result
    }

    /// Run the relay until `shutdown` is cancelled.
    ///
    /// The delivery being handled when `shutdown` is cancelled is resolved before the relay
    /// stops; no new delivery is taken after that.
    #[tracing::instrument(
        name = "relay_run",
        skip_all,
        fields(inbound_queue = %self.settings.inbound.queue, outbound_exchange = %self.settings.outbound.exchange)
    )]
    pub async fn run_until_shutdown(
        self,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, RelayError> {
        let factory = ConnectionFactory::new_from_config(&self.settings.rabbitmq)
            .map_err(RelayError::Settings)?;
        tracing::info!("Connecting to RabbitMQ at {}", factory.address());
        let connection = factory
            .new_connection()
            .await
            .map_err(RelayError::Connection)?;

        let result = self.run_on(&connection, shutdown).await;
        close(connection).await;
        result
    }

    async fn run_on(
        &self,
        connection: &Connection,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, RelayError> {
        let settings = &self.settings;
        let channel = connection
            .create_channel()
            .await
            .map_err(RelayError::Channel)?;
        if settings.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions { nowait: false })
                .await
                .map_err(RelayError::Channel)?;
        }

        topology::ensure(
            &channel,
            &[settings.inbound.clone(), settings.outbound.clone()],
        )
        .await?;

        channel
            .basic_qos(settings.prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(RelayError::Channel)?;

        let consumer = channel
            .basic_consume(
                &settings.inbound.queue,
                &Uuid::new_v4().to_string(),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| RelayError::Subscription {
                queue: settings.inbound.queue.clone(),
                source,
            })?;
        let consumer_tag = consumer.tag();
        tracing::info!(
            "Listening on exchange '{}' / queue '{}' with routing key '{}'",
            settings.inbound.exchange,
            settings.inbound.queue,
            settings.inbound.routing_key
        );

        let publisher = ChannelPublisher::new(channel.clone())
            .with_publisher_confirms(settings.publisher_confirms)
            .with_timeout(settings.publish_timeout());
        let coordinator = DeliveryCoordinator::new(
            Arc::clone(&self.processor),
            Forwarder::to_topology(&settings.outbound),
            publisher,
        );

        let result = coordinator
            .run_until_shutdown(consumer.map(|event| event.map(Delivery::from)), shutdown)
            .await
            .map_err(RelayError::Consumption);

        if channel.status().connected() {
            if let Err(e) = channel
                .basic_cancel(consumer_tag.as_str(), BasicCancelOptions::default())
                .await
            {
                tracing::warn!("Failed to cancel the subscription: {}", e);
            }
        }
        result
    }
}

/// Close the connection with RabbitMq.
///
/// Takes the connection by value: it cannot be used, or closed, again afterwards.
async fn close(connection: Connection) {
    if !connection.status().connected() {
        tracing::warn!("RabbitMQ connection already closed");
        return;
    }
    match connection.close(REPLY_SUCCESS, "relay shutting down").await {
        Ok(()) => tracing::info!("RabbitMQ consumer stopped"),
        Err(e) => tracing::warn!("Failed to close the RabbitMQ connection: {}", e),
    }
}
