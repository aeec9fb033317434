use crate::helpers::get_connection_factory;
use carrot_relay::amqp::options::{ConfirmSelectOptions, ExchangeDeclareOptions};
use carrot_relay::amqp::types::FieldTable;
use carrot_relay::amqp::{Channel, Connection};
use carrot_relay::publishers::{ChannelPublisher, MessageEnvelope, Publish, PublisherError};
use uuid::Uuid;

/// A channel in confirm mode with an exchange that has no queue bound to it.
async fn channel_with_unbound_exchange() -> (Connection, Channel, String) {
    let connection = get_connection_factory().new_connection().await.unwrap();
    let channel = connection.create_channel().await.unwrap();
    channel
        .confirm_select(ConfirmSelectOptions { nowait: false })
        .await
        .unwrap();
    let exchange = format!("unbound-{}", Uuid::new_v4());
    channel
        .exchange_declare(
            &exchange,
            lapin::ExchangeKind::Direct,
            ExchangeDeclareOptions {
                auto_delete: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap();
    (connection, channel, exchange)
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn unroutable_message_is_reported_when_confirms_are_enabled() {
    // Arrange
    let (_connection, channel, exchange) = channel_with_unbound_exchange().await;
    let publisher = ChannelPublisher::new(channel).with_publisher_confirms(true);

    // Act
    let error = publisher
        .publish(MessageEnvelope::new(&exchange, "nobody.listens").with_payload(b"{}".to_vec()))
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(error, PublisherError::UnroutableMessage(_)));
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn unroutable_message_is_dropped_without_confirms() {
    let (_connection, channel, exchange) = channel_with_unbound_exchange().await;
    let publisher = ChannelPublisher::new(channel);

    let result = publisher
        .publish(MessageEnvelope::new(&exchange, "nobody.listens").with_payload(b"{}".to_vec()))
        .await;

    assert!(result.is_ok());
}
