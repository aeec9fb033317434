use serde::Deserialize;

/// The routing algorithm of an exchange.
///
/// Only the kinds that route on a routing key (or ignore it entirely) are supported:
/// a [`TopologyDescriptor`] always binds its queue with a single routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
    Topic,
    Fanout,
}

impl ExchangeKind {
    /// The name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Fanout => "fanout",
        }
    }
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        }
    }
}

fn durable_by_default() -> bool {
    true
}

fn direct_by_default() -> ExchangeKind {
    ExchangeKind::Direct
}

/// One exchange, one queue and the binding between them.
///
/// The relay works with two of these: the inbound side it consumes from and the outbound
/// side it forwards to. Descriptors are built once from configuration and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopologyDescriptor {
    /// The name of the exchange.
    pub exchange: String,
    /// How the exchange routes messages to its bound queues.
    #[serde(default = "direct_by_default")]
    pub kind: ExchangeKind,
    /// The name of the queue bound to `exchange`.
    pub queue: String,
    /// The routing key used to bind `queue` to `exchange`.
    ///
    /// On the outbound side it is also the routing key forwarded messages are published with.
    pub routing_key: String,
    /// Whether the exchange and the queue survive a broker restart.
    #[serde(default = "durable_by_default")]
    pub durable: bool,
}

impl TopologyDescriptor {
    /// A durable, direct exchange bound to a durable queue.
    pub fn direct(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            kind: ExchangeKind::Direct,
            queue: queue.into(),
            routing_key: routing_key.into(),
            durable: true,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }
}
