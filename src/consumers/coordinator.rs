use crate::consumers::delivery::{BrokerAction, Delivery, ResolutionError};
use crate::consumers::processor::{ProcessingError, Processor};
use crate::payload::decode;
use crate::publishers::{ForwardError, Forwarder, Publish};
use amq_protocol_types::DeliveryTag;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What happened to a delivery on its way through the relay.
#[derive(Debug)]
pub enum Outcome {
    /// The payload was processed and forwarded to the outbound exchange.
    Forwarded,
    /// The processor returned an error; nothing was forwarded.
    ProcessingFailed(ProcessingError),
    /// The payload was processed but could not be forwarded.
    ForwardFailed(ForwardError),
}

impl Outcome {
    /// Only a forwarded payload is acknowledged - everything else goes back to the queue.
    pub fn broker_action(&self) -> BrokerAction {
        match self {
            Self::Forwarded => BrokerAction::Ack,
            Self::ProcessingFailed(_) | Self::ForwardFailed(_) => BrokerAction::Nack,
        }
    }
}

/// The result of [`DeliveryCoordinator::handle`].
#[derive(Debug)]
pub struct HandledDelivery {
    pub delivery_tag: DeliveryTag,
    pub outcome: Outcome,
    /// Set if the broker could not be told about the outcome.
    ///
    /// The delivery stays unacknowledged on the broker side and will be redelivered once the
    /// channel goes away.
    pub resolution_error: Option<ResolutionError>,
}

impl HandledDelivery {
    /// The action we asked the broker to take for this delivery.
    pub fn broker_action(&self) -> BrokerAction {
        self.outcome.broker_action()
    }
}

/// Counters describing a run of [`DeliveryCoordinator::run_until_shutdown`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Deliveries forwarded and acknowledged.
    pub acked: usize,
    /// Deliveries negatively acknowledged and requeued.
    pub requeued: usize,
    /// Deliveries whose ack/nack could not be sent to the broker.
    pub resolution_failures: usize,
}

impl RunSummary {
    fn record(&mut self, handled: &HandledDelivery) {
        if handled.resolution_error.is_some() {
            self.resolution_failures += 1;
            return;
        }
        match handled.broker_action() {
            BrokerAction::Ack => self.acked += 1,
            BrokerAction::Nack => self.requeued += 1,
        }
    }
}

/// Drives every inbound delivery through decode → process → forward, then settles it.
///
/// Deliveries are handled one at a time, in the order they are received. How many
/// unacknowledged deliveries the broker hands over at once is bounded by the prefetch count of
/// the subscription, not by the coordinator.
pub struct DeliveryCoordinator<P> {
    processor: Arc<dyn Processor>,
    forwarder: Forwarder,
    publisher: P,
}

impl<P: Publish> DeliveryCoordinator<P> {
    pub fn new(processor: Arc<dyn Processor>, forwarder: Forwarder, publisher: P) -> Self {
        Self {
            processor,
            forwarder,
            publisher,
        }
    }

    /// Handle a single delivery, resolving it exactly once.
    ///
    /// The delivery is acknowledged only after its payload has been forwarded. A processing or
    /// forwarding failure leads to a nack with requeue. Nothing is returned as an error: the
    /// outcome is reported in the [`HandledDelivery`].
    #[tracing::instrument(
        name = "handle_delivery",
        skip_all,
        fields(delivery_tag = delivery.delivery_tag, redelivered = delivery.redelivered),
        level = tracing::Level::DEBUG
    )]
    pub async fn handle(&self, delivery: Delivery) -> HandledDelivery {
        let delivery_tag = delivery.delivery_tag;
        let payload = decode(&delivery.data);
        if !payload.is_structured() {
            tracing::warn!(
                delivery_tag,
                "Payload is not a JSON document, forwarding it as text"
            );
        }

        let outcome = match self.processor.process(&payload).await {
            Err(e) => Outcome::ProcessingFailed(e),
            Ok(()) => match self.forwarder.forward(&self.publisher, &payload).await {
                Ok(()) => Outcome::Forwarded,
                Err(e) => Outcome::ForwardFailed(e),
            },
        };

        match &outcome {
            Outcome::Forwarded => {
                tracing::debug!(delivery_tag, "Payload forwarded");
            }
            Outcome::ProcessingFailed(e) => {
                tracing::error!(
                    delivery_tag,
                    error = ?e,
                    "Failed to process message, requeuing"
                );
            }
            Outcome::ForwardFailed(e) => {
                tracing::error!(
                    delivery_tag,
                    error = ?e,
                    "Failed to forward message, requeuing"
                );
            }
        }

        let resolution_error = delivery.resolve(outcome.broker_action()).await.err();
        if let Some(e) = &resolution_error {
            tracing::error!(delivery_tag, error = ?e, "Failed to settle delivery with the broker");
        }

        HandledDelivery {
            delivery_tag,
            outcome,
            resolution_error,
        }
    }

    /// Pull deliveries from `deliveries` and handle them until `shutdown` is cancelled or the
    /// stream ends.
    ///
    /// `shutdown` is checked before every receive, never while a delivery is being handled:
    /// a delivery that has been received is always resolved before this returns.
    ///
    /// An error in the stream (e.g. the channel is closed or the connection with RabbitMq is
    /// lost) ends the loop with that error.
    pub async fn run_until_shutdown<S>(
        &self,
        deliveries: S,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, anyhow::Error>
    where
        S: Stream<Item = Result<Delivery, lapin::Error>>,
    {
        tokio::pin!(deliveries);
        let mut summary = RunSummary::default();

        let result = loop {
            tokio::select! {
                // we want to poll in the specified order - preferring the handling of shutdowns
                // before going on with processing more deliveries
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, no longer accepting deliveries");
                    break Ok(());
                }

                event = deliveries.next() => {
                    match event {
                        // the subscription has been cancelled
                        None => break Ok(()),
                        Some(Err(e)) => {
                            tracing::error!("Consumer error: {}", e);
                            break Err(anyhow::Error::from(e).context("The delivery stream failed"));
                        }
                        Some(Ok(delivery)) => {
                            let handled = self.handle(delivery).await;
                            summary.record(&handled);
                        }
                    }
                }
            }
        };

        tracing::info!(
            acked = summary.acked,
            requeued = summary.requeued,
            resolution_failures = summary.resolution_failures,
            "Consumption loop stopped"
        );
        result.map(|()| summary)
    }
}
