//! `carrot-relay` relays messages between two RabbitMQ topologies, built on top of [`lapin`].
//!
//! Messages are consumed from an inbound queue, handed to a [`Processor`](crate::consumers::Processor),
//! republished durably to an outbound exchange and only then acknowledged. A failure anywhere
//! along the way puts the message back on the inbound queue: delivery is at-least-once.
//!
//! [`Relay`](crate::relay::Relay) is the best starting point to learn more about what
//! `carrot-relay` provides; [`DeliveryCoordinator`](crate::consumers::DeliveryCoordinator)
//! holds the per-message logic.

pub mod amqp;
pub mod configuration;
pub mod consumers;
pub mod payload;
pub mod publishers;
pub mod relay;
pub mod shutdown;
pub mod telemetry;
pub mod topology;
