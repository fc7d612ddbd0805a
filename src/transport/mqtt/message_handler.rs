//! Pure routing of rumqttc events
//!
//! Maps raw event loop output onto the handful of outcomes the transport
//! cares about. No I/O happens here.

use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet, QoS};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(ack) => match ack.code {
                    ConnectReturnCode::Success => EventRoute::ConnectionAcknowledged,
                    code => EventRoute::ConnectionRefused(format!("{code:?}")),
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::LocalDisconnect,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// QoS used for every subscription and publish
    ///
    /// Delivery is at most once and unacknowledged.
    pub fn link_qos() -> QoS {
        QoS::AtMostOnce
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged,
    /// Broker answered ConnAck with a refusal code
    ConnectionRefused(String),
    /// Message received on subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker sent a Disconnect packet
    Disconnected,
    /// Our own Disconnect request went out
    LocalDisconnect,
    /// Subscription confirmed
    SubscriptionConfirmed { packet_id: u16 },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rumqttc::{ConnAck, Publish, SubAck, SubscribeReasonCode};

    #[test]
    fn test_route_connack_success() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::ConnectionAcknowledged
        );
    }

    #[test]
    fn test_route_connack_refused() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        )));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::ConnectionRefused(code) if code.contains("NotAuthorized")
        ));
    }

    #[test]
    fn test_route_publish() {
        let payload = Bytes::from_static(br#"{"properties":{"temp":5}}"#);
        let publish = Publish::from_bytes("ENG551/Ashraful/my_temperature", QoS::AtMostOnce, payload);
        let event = Event::Incoming(Packet::Publish(publish));

        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::MessageReceived {
                topic: "ENG551/Ashraful/my_temperature".to_string(),
                payload: br#"{"properties":{"temp":5}}"#.to_vec(),
            }
        );
    }

    #[test]
    fn test_route_disconnects() {
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::Disconnect)),
            EventRoute::Disconnected
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Disconnect)),
            EventRoute::LocalDisconnect
        );
    }

    #[test]
    fn test_route_suback() {
        let suback = SubAck::new(7, vec![SubscribeReasonCode::Success(QoS::AtMostOnce)]);
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::SubAck(suback))),
            EventRoute::SubscriptionConfirmed { packet_id: 7 }
        );
    }

    #[test]
    fn test_route_infrastructure_and_outgoing() {
        assert!(matches!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::PingResp)),
            EventRoute::InfrastructureEvent(_)
        ));
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::OutgoingEvent
        );
    }

    #[test]
    fn test_link_qos_is_at_most_once() {
        assert_eq!(MessageHandler::link_qos(), QoS::AtMostOnce);
    }
}
