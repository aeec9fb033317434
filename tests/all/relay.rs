//! End-to-end tests. They need a RabbitMq broker listening on `localhost:5672`
//! (e.g. `docker run -p 5672:5672 rabbitmq:3`) and are run with `cargo test -- --ignored`.
use crate::helpers::{get_connection_factory, get_isolated_relay_settings};
use carrot_relay::amqp::options::{BasicGetOptions, BasicPublishOptions, ExchangeDeclareOptions};
use carrot_relay::amqp::types::FieldTable;
use carrot_relay::amqp::{BasicProperties, Channel};
use carrot_relay::consumers::ClosureProcessor;
use carrot_relay::payload::DecodedPayload;
use carrot_relay::relay::{Relay, RelayError};
use carrot_relay::topology::ProvisionStep;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

async fn publish_inbound(channel: &Channel, exchange: &str, routing_key: &str, body: &[u8]) {
    channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            body,
            BasicProperties::default(),
        )
        .await
        .unwrap()
        .await
        .unwrap();
}

/// Poll `queue` until a message shows up, or give up after a few seconds.
async fn get_one(channel: &Channel, queue: &str) -> Option<lapin::message::BasicGetMessage> {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if let Some(message) = channel
            .basic_get(queue, BasicGetOptions { no_ack: true })
            .await
            .unwrap()
        {
            return Some(message);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    None
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn json_message_is_relayed_to_the_outbound_queue() {
    // Arrange
    let settings = get_isolated_relay_settings();
    let inbound = settings.inbound.clone();
    let outbound = settings.outbound.clone();
    let shutdown = CancellationToken::new();
    let relay = tokio::spawn(Relay::new(settings).run_until_shutdown(shutdown.clone()));

    let connection = get_connection_factory().new_connection().await.unwrap();
    let channel = connection.create_channel().await.unwrap();
    // Give the relay time to provision the topology.
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Act
    publish_inbound(
        &channel,
        &inbound.exchange,
        &inbound.routing_key,
        br#"{"id": 42, "name": "test"}"#,
    )
    .await;

    // Assert
    let message = get_one(&channel, &outbound.queue)
        .await
        .expect("Nothing was forwarded");
    let body: serde_json::Value = serde_json::from_slice(&message.delivery.data).unwrap();
    assert_eq!(body, serde_json::json!({"id": 42, "name": "test"}));
    assert_eq!(*message.delivery.properties.delivery_mode(), Some(2));
    assert_eq!(
        message
            .delivery
            .properties
            .content_type()
            .as_ref()
            .map(|c| c.as_str()),
        Some("application/json")
    );

    shutdown.cancel();
    let summary = relay.await.unwrap().unwrap();
    assert_eq!(summary.acked, 1);
    assert_eq!(summary.requeued, 0);

    // The inbound message was acknowledged: nothing is left behind.
    assert!(channel
        .basic_get(&inbound.queue, BasicGetOptions { no_ack: true })
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn failed_processing_is_redelivered() {
    // Arrange
    let settings = get_isolated_relay_settings();
    let inbound = settings.inbound.clone();
    let outbound = settings.outbound.clone();
    let attempts = Arc::new(AtomicUsize::new(0));
    let processor = ClosureProcessor({
        let attempts = attempts.clone();
        move |_: &DecodedPayload| {
            // Fail the first attempt only.
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow::anyhow!("transient failure"))
            } else {
                Ok(())
            }
        }
    });
    let shutdown = CancellationToken::new();
    let relay = tokio::spawn(
        Relay::new(settings)
            .with_processor(processor)
            .run_until_shutdown(shutdown.clone()),
    );

    let connection = get_connection_factory().new_connection().await.unwrap();
    let channel = connection.create_channel().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Act
    publish_inbound(&channel, &inbound.exchange, &inbound.routing_key, b"retry me").await;

    // Assert
    let message = get_one(&channel, &outbound.queue)
        .await
        .expect("Nothing was forwarded");
    assert_eq!(message.delivery.data, br#""retry me""#);

    shutdown.cancel();
    let summary = relay.await.unwrap().unwrap();
    assert_eq!(summary.requeued, 1);
    assert_eq!(summary.acked, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn idle_relay_shuts_down_promptly() {
    let shutdown = CancellationToken::new();
    let relay = tokio::spawn(Relay::new(get_isolated_relay_settings()).run_until_shutdown(shutdown.clone()));
    tokio::time::sleep(Duration::from_secs(1)).await;

    shutdown.cancel();

    let summary = tokio::time::timeout(Duration::from_secs(5), relay)
        .await
        .expect("The relay did not shut down in time")
        .unwrap()
        .unwrap();
    assert_eq!(summary.acked + summary.requeued + summary.resolution_failures, 0);
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn exchange_kind_mismatch_is_a_startup_error() {
    // Arrange
    let settings = get_isolated_relay_settings();
    let connection = get_connection_factory().new_connection().await.unwrap();
    let channel = connection.create_channel().await.unwrap();
    channel
        .exchange_declare(
            &settings.inbound.exchange,
            lapin::ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap();

    // Act
    let error = Relay::new(settings)
        .run_until_shutdown(CancellationToken::new())
        .await
        .unwrap_err();

    // Assert
    match error {
        RelayError::Provision(e) => assert_eq!(e.step, ProvisionStep::DeclareExchange),
        other => panic!("Expected a provisioning error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_broker_is_a_startup_error() {
    let mut settings = get_isolated_relay_settings();
    // Nothing listens on the discard port.
    settings.rabbitmq.port = 9;
    settings.rabbitmq.connection_timeout_seconds = Some(2);

    let error = Relay::new(settings)
        .run_until_shutdown(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, RelayError::Connection(_)));
}
