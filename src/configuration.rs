//! Settings for a relay process and how they are loaded.
use crate::amqp::configuration::RabbitMqSettings;
use crate::topology::TopologyDescriptor;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, FileSourceFile};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

/// Environment variable pointing at a configuration file, overriding [`DEFAULT_CONFIG_FILE`].
pub const CONFIG_FILE_ENV_VAR: &str = "RELAY_CONFIG";
/// Looked up (with any supported extension) if [`CONFIG_FILE_ENV_VAR`] is not set.
pub const DEFAULT_CONFIG_FILE: &str = "config/relay";

/// Everything a [`Relay`](crate::relay::Relay) needs to run.
///
/// Built once, at process start, and handed over to the relay. Every field has a default,
/// matching an out-of-the-box local RabbitMq.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// How to reach the broker.
    pub rabbitmq: RabbitMqSettings,
    /// Where messages are consumed from.
    pub inbound: TopologyDescriptor,
    /// Where messages are forwarded to.
    pub outbound: TopologyDescriptor,
    /// The maximum number of unacknowledged deliveries the broker hands over at once.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub prefetch_count: u16,
    /// Wait for the broker to confirm every forwarded message before acknowledging the
    /// delivery it came from.
    pub publisher_confirms: bool,
    /// Give up on forwarding a message after this many seconds.
    /// Forwarding waits indefinitely if left unspecified.
    pub publish_timeout_seconds: Option<u64>,
    /// The log filter used when `RUST_LOG` is not set - e.g. `info` or `carrot_relay=debug`.
    pub log_level: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            rabbitmq: RabbitMqSettings::default(),
            inbound: TopologyDescriptor::direct(
                "messaging",
                "messaging-queue",
                "messaging.execute",
            ),
            outbound: TopologyDescriptor::direct(
                "consumer",
                "consumer-queue",
                "consumer.execute",
            ),
            prefetch_count: 1,
            publisher_confirms: true,
            publish_timeout_seconds: None,
            log_level: "info".into(),
        }
    }
}

impl RelaySettings {
    pub fn publish_timeout(&self) -> Option<std::time::Duration> {
        self.publish_timeout_seconds
            .map(std::time::Duration::from_secs)
    }
}

/// Load the relay settings.
///
/// Sources, from lowest to highest priority:
/// - the defaults of [`RelaySettings`];
/// - the file named by `RELAY_CONFIG`, or `config/relay.{toml,yaml,json,...}` if present;
/// - environment variables prefixed with `RELAY_`, using `__` to separate nested keys
///   (e.g. `RELAY_RABBITMQ__HOST=rabbit`, `RELAY_PREFETCH_COUNT=10`).
pub fn load() -> Result<RelaySettings, ConfigError> {
    let file = match std::env::var(CONFIG_FILE_ENV_VAR) {
        Ok(path) => File::with_name(&path).required(true),
        Err(_) => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };
    load_from(file, "RELAY")
}

fn load_from(
    file: File<FileSourceFile, FileFormat>,
    env_prefix: &str,
) -> Result<RelaySettings, ConfigError> {
    let defaults = RelaySettings::default();
    let builder = with_topology_defaults(Config::builder(), "inbound", &defaults.inbound)?;
    let builder = with_topology_defaults(builder, "outbound", &defaults.outbound)?;
    builder
        .add_source(file)
        .add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()
}

/// Register the fields of `descriptor` as defaults under `side`, so that a source can override
/// a single field (e.g. `RELAY_INBOUND__QUEUE`) without spelling out the whole descriptor.
fn with_topology_defaults(
    builder: ConfigBuilder<DefaultState>,
    side: &str,
    descriptor: &TopologyDescriptor,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default(format!("{side}.exchange"), descriptor.exchange.clone())?
        .set_default(format!("{side}.kind"), descriptor.kind.as_str())?
        .set_default(format!("{side}.queue"), descriptor.queue.clone())?
        .set_default(format!("{side}.routing_key"), descriptor.routing_key.clone())?
        .set_default(format!("{side}.durable"), descriptor.durable)
}
