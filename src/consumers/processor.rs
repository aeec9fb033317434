//! The `Processor` trait is the business step of the relay, run on every decoded payload
//! before it is forwarded.
use crate::payload::DecodedPayload;

/// The error type returned by [`Processor`]s.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct ProcessingError(#[from] anyhow::Error);

/// Implementers of the `Processor` trait are invoked by the
/// [`DeliveryCoordinator`](crate::consumers::DeliveryCoordinator) with every decoded payload.
///
/// # Scope
///
/// `process` does not get access to the underlying RabbitMq channel nor to the delivery.
/// The coordinator takes care of forwarding the payload and of acking/nacking the delivery
/// according to the outcome: returning an error causes the delivery to be requeued.
///
/// The payload is borrowed immutably - what gets forwarded is exactly what was decoded.
#[async_trait::async_trait]
pub trait Processor: Send + Sync + 'static {
    async fn process(&self, payload: &DecodedPayload) -> Result<(), ProcessingError>;
}

/// Logs every payload it sees. The default processor of a [`Relay`](crate::relay::Relay).
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPayload;

#[async_trait::async_trait]
impl Processor for LogPayload {
    async fn process(&self, payload: &DecodedPayload) -> Result<(), ProcessingError> {
        tracing::info!("Processed payload: {}", payload);
        Ok(())
    }
}

/// Wrapper type to turn a closure into a [`Processor`].
///
/// We do not require closures to return a [`ProcessingError`] directly - it is enough for them
/// to return an error type that can be converted into one.
pub struct ClosureProcessor<F>(pub F);

#[async_trait::async_trait]
impl<F, E> Processor for ClosureProcessor<F>
where
    F: Fn(&DecodedPayload) -> Result<(), E> + Send + Sync + 'static,
    E: Into<ProcessingError>,
{
    async fn process(&self, payload: &DecodedPayload) -> Result<(), ProcessingError> {
        (self.0)(payload).map_err(Into::into)
    }
}

/// Implement the [`Processor`] trait for all boxed processors.
#[async_trait::async_trait]
impl<P> Processor for Box<P>
where
    P: Processor + ?Sized,
{
    async fn process(&self, payload: &DecodedPayload) -> Result<(), ProcessingError> {
        P::process(self, payload).await
    }
}
