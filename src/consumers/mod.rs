//! Facilities to consume messages from the inbound queue. Check out [`DeliveryCoordinator`] as a
//! starting point.
pub use coordinator::{DeliveryCoordinator, HandledDelivery, Outcome, RunSummary};
pub use delivery::{Acknowledge, BrokerAction, Delivery, ResolutionError};
pub use processor::{ClosureProcessor, LogPayload, ProcessingError, Processor};

mod coordinator;
mod delivery;
mod processor;
