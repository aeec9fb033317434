//! Broker topology: the exchanges, queues and bindings the relay depends on.
//!
//! The relay provisions its own topology before it starts consuming, rather than relying on
//! it being created out-of-band. See [`ensure`].
mod descriptor;
mod provision;

pub use descriptor::{ExchangeKind, TopologyDescriptor};
pub use provision::{ensure, ProvisionError, ProvisionStep, TopologyChannel};
